//! Forecast generation: pluggable daily-sales models and the engine that
//! runs them per category after each completed ingestion batch.

pub mod confidence;
pub mod engine;
pub mod error;
pub mod models;
pub mod worker;

pub use engine::{EngineOutcome, ForecastEngine};
pub use error::ModelError;
pub use models::{model_for, ForecastModel, ModelForecast};
