pub mod cities;
pub mod health;
pub mod metrics;

pub use cities::{get_population, upsert_city};
pub use health::health_check;
pub use metrics::metrics;
