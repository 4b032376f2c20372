use thiserror::Error;

/// A model's internal failure. Isolated to one (model, category) pair;
/// the engine logs it and moves on.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("insufficient data: need {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("model not fitted")]
    NotFitted,
}
