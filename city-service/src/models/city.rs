use serde::{Deserialize, Serialize};

/// A city document as it is stored, keyed by `city`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityRecord {
    pub city: String,
    pub population: u64,
}

impl CityRecord {
    pub fn new(city: impl Into<String>, population: u64) -> Self {
        Self {
            city: city.into(),
            population,
        }
    }
}

/// Optimistic-concurrency token of a stored document.
///
/// Maps onto Elasticsearch's `_seq_no` / `_primary_term` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub seq_no: u64,
    pub primary_term: u64,
}

/// A fetched record together with the revision it was read at, if the store
/// reported one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCity {
    pub record: CityRecord,
    pub revision: Option<Revision>,
}
