pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod worker;

pub use dataset::{parse_dataset, Dataset};
pub use error::IngestError;
pub use pipeline::{BatchOutcome, IngestionPipeline};
