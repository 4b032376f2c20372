pub mod error;
pub mod memory;
pub mod pg;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{FactFilter, ForecastFilter, TimeSeriesStore};
