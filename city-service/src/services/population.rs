//! Upsert and lookup of city populations on top of a [`DocumentStore`].

use crate::config::UpsertMode;
use crate::models::{CityRecord, StoredCity};
use crate::services::store::{DocumentStore, StoreError, WritePrecondition};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Result of an accepted upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn message(self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "City inserted successfully",
            UpsertOutcome::Updated => "Population updated successfully",
            UpsertOutcome::Unchanged => "Population unchanged",
        }
    }

    pub fn operation(self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "insert",
            UpsertOutcome::Updated | UpsertOutcome::Unchanged => "update",
        }
    }

    fn label(self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

pub struct PopulationService {
    store: Arc<dyn DocumentStore>,
    collection: String,
    mode: UpsertMode,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PopulationService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        mode: UpsertMode,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            mode,
            key_locks: DashMap::new(),
        }
    }

    /// Fetches the population stored for `city`, `None` if it was never
    /// inserted.
    pub async fn get(&self, city: &str) -> Result<Option<CityRecord>, StoreError> {
        let stored = self.store.get_by_id(&self.collection, city).await?;
        Ok(stored.map(|s| s.record))
    }

    /// Inserts the city if absent, replaces it if the population differs,
    /// and leaves it untouched otherwise.
    #[tracing::instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn upsert(&self, city: &str, population: u64) -> Result<UpsertOutcome, StoreError> {
        let result = match self.mode {
            UpsertMode::BestEffort => self.read_compare_write(city, population).await,
            UpsertMode::Strict => {
                let key_lock = self.key_lock(city);
                let _held = key_lock.lock().await;
                self.read_compare_write(city, population).await
            }
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(outcome = ?outcome, "Upsert applied");
                counter!(
                    "city_upserts_total",
                    "operation" => outcome.operation(),
                    "outcome" => outcome.label()
                )
                .increment(1);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upsert failed");
                counter!(
                    "city_upserts_total",
                    "operation" => "unknown",
                    "outcome" => "error"
                )
                .increment(1);
            }
        }

        result
    }

    async fn read_compare_write(
        &self,
        city: &str,
        population: u64,
    ) -> Result<UpsertOutcome, StoreError> {
        let existing = self.store.get_by_id(&self.collection, city).await?;
        let record = CityRecord::new(city, population);

        match existing {
            Some(StoredCity { record: current, .. }) if current.population == population => {
                Ok(UpsertOutcome::Unchanged)
            }
            Some(StoredCity { revision, .. }) => {
                let precondition = match (self.mode, revision) {
                    (UpsertMode::Strict, Some(revision)) => WritePrecondition::Matches(revision),
                    _ => WritePrecondition::None,
                };
                self.store
                    .put_by_id(&self.collection, city, &record, precondition)
                    .await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let precondition = match self.mode {
                    UpsertMode::Strict => WritePrecondition::Absent,
                    UpsertMode::BestEffort => WritePrecondition::None,
                };
                self.store
                    .put_by_id(&self.collection, city, &record, precondition)
                    .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn key_lock(&self, city: &str) -> KeyLock<'_> {
        let lock = self
            .key_locks
            .entry(city.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        KeyLock {
            locks: &self.key_locks,
            key: city.to_string(),
            lock,
        }
    }
}

/// Handle on the per-city mutex. Dropping it, including when the upsert
/// future is cancelled, removes the map entry once no other upsert holds it.
struct KeyLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl KeyLock<'_> {
    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // The map and this handle are the only owners when nobody else waits.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}
