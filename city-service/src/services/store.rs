//! Document store abstraction.
//!
//! The service only needs key-based reads and writes plus collection
//! bootstrap; everything else (indexing, persistence, replication) belongs to
//! the store itself.

use crate::models::{CityRecord, Revision, StoredCity};
use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

/// Failure reported by a document store.
///
/// Not-found is not an error: `get_by_id` returns `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store rejected the request as malformed (HTTP 400 from Elasticsearch).
    #[error("Malformed store request: {0}")]
    MalformedRequest(String),

    /// A write precondition did not hold.
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// Anything else, including transport failures.
    #[error("Store failure: {0}")]
    Other(String),
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePrecondition {
    /// Unconditional write; last write wins.
    #[default]
    None,
    /// Only create; fail with `Conflict` if the document exists.
    Absent,
    /// Only replace the document if it is still at this revision.
    Matches(Revision),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    async fn create_collection(&self, collection: &str) -> Result<(), StoreError>;

    async fn get_by_id(&self, collection: &str, id: &str)
        -> Result<Option<StoredCity>, StoreError>;

    async fn put_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &CityRecord,
        precondition: WritePrecondition,
    ) -> Result<(), StoreError>;
}

/// Creates `collection` unless it already exists.
///
/// Returns `true` when the collection was created.
pub async fn ensure_collection(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<bool, StoreError> {
    if store.collection_exists(collection).await? {
        tracing::info!(collection, "Collection already exists");
        return Ok(false);
    }

    store.create_collection(collection).await?;
    tracing::info!(collection, "Created collection");
    Ok(true)
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedRequest(msg) => AppError::StoreRequest(anyhow::anyhow!(msg)),
            StoreError::Conflict(_) => {
                AppError::Conflict("Concurrent update detected for city".to_string())
            }
            StoreError::Other(msg) => AppError::InternalError(anyhow::anyhow!(msg)),
        }
    }
}
