use crate::models::{CityRecord, Revision, StoredCity};
use crate::services::store::{DocumentStore, StoreError, WritePrecondition};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    collections: HashSet<String>,
    documents: HashMap<(String, String), (CityRecord, Revision)>,
    next_seq_no: u64,
    writes: usize,
    failure: Option<StoreError>,
}

/// Process-local document store.
///
/// Backs `STORE_BACKEND=memory` and the test suite. Revisions and write
/// preconditions behave like Elasticsearch's `if_seq_no` / `op_type=create`.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `err` until `clear_failure`.
    pub fn fail_with(&self, err: StoreError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failure = Some(err);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failure = None;
        }
    }

    /// Number of successful document writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Other(format!("In-memory store mutex poisoned: {}", e)))?;
        if let Some(err) = inner.failure.clone() {
            return Err(err);
        }
        Ok(inner)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.collections.contains(collection))
    }

    async fn create_collection(&self, collection: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.collections.insert(collection.to_string()) {
            return Err(StoreError::MalformedRequest(format!(
                "resource_already_exists_exception: index [{}] already exists",
                collection
            )));
        }
        Ok(())
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredCity>, StoreError> {
        let inner = self.lock()?;
        let found = inner
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|(record, revision)| StoredCity {
                record: record.clone(),
                revision: Some(*revision),
            });
        Ok(found)
    }

    async fn put_by_id(
        &self,
        collection: &str,
        id: &str,
        record: &CityRecord,
        precondition: WritePrecondition,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let key = (collection.to_string(), id.to_string());
        let current = inner.documents.get(&key).map(|(_, revision)| *revision);

        match (precondition, current) {
            (WritePrecondition::None, _) => {}
            (WritePrecondition::Absent, None) => {}
            (WritePrecondition::Absent, Some(_)) => {
                return Err(StoreError::Conflict(format!(
                    "[{}]: version conflict, document already exists",
                    id
                )));
            }
            (WritePrecondition::Matches(expected), Some(actual)) if expected == actual => {}
            (WritePrecondition::Matches(expected), _) => {
                return Err(StoreError::Conflict(format!(
                    "[{}]: version conflict, required seqNo [{}], primary term [{}]",
                    id, expected.seq_no, expected.primary_term
                )));
            }
        }

        // Writing into a missing collection creates it, as Elasticsearch does.
        inner.collections.insert(collection.to_string());

        let revision = Revision {
            seq_no: inner.next_seq_no,
            primary_term: 1,
        };
        inner.next_seq_no += 1;
        inner.writes += 1;
        inner.documents.insert(key, (record.clone(), revision));
        Ok(())
    }
}
