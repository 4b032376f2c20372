//! Ingestion error types.

use thiserror::Error;

use tidecast_queue::QueueError;
use tidecast_store::StoreError;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed dataset: missing columns, unparsable dates or values.
    /// Fails the batch with the message persisted; zero fact effects.
    #[error("{0}")]
    Validation(String),

    /// Store failure inside the batch transaction; fully rolled back.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("cannot read dataset: {0}")]
    Io(#[from] std::io::Error),
}
