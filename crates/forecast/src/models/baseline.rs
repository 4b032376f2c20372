//! Naive baseline: the mean of the last week of observations, repeated
//! flat across the horizon. Deliberately simple; the reference every
//! other model has to beat.

use tidecast_core::model::ModelKind;

use crate::error::ModelError;
use crate::models::{check_finite, ForecastModel, ModelForecast};

const WINDOW: usize = 7;

#[derive(Debug, Default)]
pub struct Baseline {
    level: Option<f64>,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForecastModel for Baseline {
    fn kind(&self) -> ModelKind {
        ModelKind::Baseline
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelError> {
        if history.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        check_finite(history)?;
        let tail = &history[history.len().saturating_sub(WINDOW)..];
        self.level = Some(tail.iter().sum::<f64>() / tail.len() as f64);
        Ok(())
    }

    fn forecast(
        &self,
        horizon: usize,
        _confidence_level: f64,
    ) -> Result<ModelForecast, ModelError> {
        let level = self.level.ok_or(ModelError::NotFitted)?;
        Ok(ModelForecast {
            values: vec![level; horizon],
            // A flat mean carries no residual structure worth an interval.
            bounds: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_last_seven() {
        let history: Vec<f64> = vec![1000.0, 1000.0, 10.0, 20.0, 30.0, 10.0, 20.0, 30.0, 10.0];
        let mut model = Baseline::new();
        model.fit(&history).unwrap();
        let out = model.forecast(3, 0.95).unwrap();
        let expected = (10.0 + 20.0 + 30.0 + 10.0 + 20.0 + 30.0 + 10.0) / 7.0;
        assert_eq!(out.values, vec![expected; 3]);
        assert!(out.bounds.is_none());
    }

    #[test]
    fn test_short_history_uses_all_points() {
        let mut model = Baseline::new();
        model.fit(&[4.0, 8.0]).unwrap();
        let out = model.forecast(1, 0.95).unwrap();
        assert_eq!(out.values, vec![6.0]);
    }

    #[test]
    fn test_unfitted_rejected() {
        let model = Baseline::new();
        assert!(matches!(
            model.forecast(1, 0.95),
            Err(ModelError::NotFitted)
        ));
    }

    #[test]
    fn test_empty_history_rejected() {
        let mut model = Baseline::new();
        assert!(matches!(
            model.fit(&[]),
            Err(ModelError::InsufficientData { .. })
        ));
    }
}
