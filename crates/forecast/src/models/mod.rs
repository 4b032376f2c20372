//! The interchangeable forecasting models.
//!
//! Each model consumes a category's daily history as a plain `&[f64]`
//! (ascending by date) and produces point forecasts for the next
//! `horizon` days, with confidence bounds where the model supports them.

pub mod baseline;
pub mod holt_winters;
pub mod seasonal_ar;

use tidecast_core::model::ModelKind;

use crate::confidence::Bounds;
use crate::error::ModelError;

pub use baseline::Baseline;
pub use holt_winters::HoltWinters;
pub use seasonal_ar::SeasonalAr;

/// Point forecasts plus optional symmetric bounds, index-aligned.
#[derive(Debug, Clone)]
pub struct ModelForecast {
    pub values: Vec<f64>,
    pub bounds: Option<Bounds>,
}

/// A fitted-then-forecast daily model.
///
/// `fit` may be called once; `forecast` any number of times after.
pub trait ForecastModel: Send {
    fn kind(&self) -> ModelKind;

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelError>;

    fn forecast(
        &self,
        horizon: usize,
        confidence_level: f64,
    ) -> Result<ModelForecast, ModelError>;
}

/// Construct the model behind a `ModelKind` with its default parameters.
pub fn model_for(kind: ModelKind) -> Box<dyn ForecastModel> {
    match kind {
        ModelKind::Baseline => Box::new(Baseline::new()),
        ModelKind::HoltWinters => Box::new(HoltWinters::weekly()),
        ModelKind::SeasonalAr => Box::new(SeasonalAr::weekly()),
    }
}

fn check_finite(history: &[f64]) -> Result<(), ModelError> {
    if history.iter().any(|x| !x.is_finite()) {
        return Err(ModelError::InvalidData(
            "history contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}
