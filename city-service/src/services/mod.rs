pub mod elasticsearch;
pub mod memory;
pub mod metrics;
pub mod population;
pub mod store;

pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use population::{PopulationService, UpsertOutcome};
pub use store::{ensure_collection, DocumentStore, StoreError, WritePrecondition};
