//! Additive triple exponential smoothing (Holt-Winters) with a weekly
//! seasonal period.
//!
//! Level: `l_t = α(y_t - s_{t-m}) + (1-α)(l_{t-1} + b_{t-1})`
//! Trend: `b_t = β(l_t - l_{t-1}) + (1-β)b_{t-1}`
//! Season: `s_t = γ(y_t - l_t) + (1-γ)s_{t-m}`

use tidecast_core::model::ModelKind;

use crate::confidence::bounds_from_residuals;
use crate::error::ModelError;
use crate::models::{check_finite, ForecastModel, ModelForecast};

#[derive(Debug)]
pub struct HoltWinters {
    alpha: f64,
    beta: f64,
    gamma: f64,
    period: usize,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    /// One-step-ahead in-sample errors, for the prediction interval.
    residuals: Vec<f64>,
    /// Length of the fitted history; aligns the seasonal index at
    /// forecast time.
    fitted_len: usize,
    fitted: bool,
}

impl HoltWinters {
    pub fn new(alpha: f64, beta: f64, gamma: f64, period: usize) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            period,
            level: 0.0,
            trend: 0.0,
            seasonal: vec![0.0; period],
            residuals: Vec::new(),
            fitted_len: 0,
            fitted: false,
        }
    }

    /// Default parameterization for daily sales with a weekly cycle.
    pub fn weekly() -> Self {
        Self::new(0.3, 0.1, 0.2, 7)
    }

    fn initialize(&mut self, history: &[f64]) {
        let m = self.period;
        self.level = history[..m].iter().sum::<f64>() / m as f64;

        let first_avg = self.level;
        let second_avg = history[m..2 * m].iter().sum::<f64>() / m as f64;
        self.trend = (second_avg - first_avg) / m as f64;

        for i in 0..m {
            self.seasonal[i] = history[i] - self.level;
        }
    }
}

impl ForecastModel for HoltWinters {
    fn kind(&self) -> ModelKind {
        ModelKind::HoltWinters
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelError> {
        let required = 2 * self.period;
        if history.len() < required {
            return Err(ModelError::InsufficientData {
                required,
                actual: history.len(),
            });
        }
        check_finite(history)?;

        self.initialize(history);
        self.residuals.clear();

        for (i, &value) in history.iter().enumerate().skip(self.period) {
            let season_idx = i % self.period;
            let prev_level = self.level;
            let prev_seasonal = self.seasonal[season_idx];

            let one_step = self.level + self.trend + prev_seasonal;
            self.residuals.push(value - one_step);

            self.level = self.alpha * (value - prev_seasonal)
                + (1.0 - self.alpha) * (self.level + self.trend);
            self.trend =
                self.beta * (self.level - prev_level) + (1.0 - self.beta) * self.trend;
            self.seasonal[season_idx] =
                self.gamma * (value - self.level) + (1.0 - self.gamma) * prev_seasonal;
        }

        self.fitted_len = history.len();
        self.fitted = true;
        Ok(())
    }

    fn forecast(
        &self,
        horizon: usize,
        confidence_level: f64,
    ) -> Result<ModelForecast, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }

        let mut values = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let season_idx = (self.fitted_len + h - 1) % self.period;
            values.push(self.level + h as f64 * self.trend + self.seasonal[season_idx]);
        }

        let bounds = bounds_from_residuals(&values, &self.residuals, confidence_level);
        Ok(ModelForecast { values, bounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Weekly pattern: weekends sell double.
    fn weekly_series(weeks: usize) -> Vec<f64> {
        (0..weeks * 7)
            .map(|i| if i % 7 >= 5 { 200.0 } else { 100.0 })
            .collect()
    }

    #[test]
    fn test_tracks_weekly_seasonality() {
        let mut model = HoltWinters::weekly();
        model.fit(&weekly_series(6)).unwrap();
        let out = model.forecast(7, 0.95).unwrap();

        // History ends at a week boundary, so steps 6 and 7 land on the
        // high-sales days.
        assert!(out.values[5] > out.values[0] + 50.0);
        assert!(out.values[6] > out.values[0] + 50.0);
        for v in &out.values[..5] {
            assert!((v - 100.0).abs() < 30.0, "weekday forecast {v}");
        }
    }

    #[test]
    fn test_tracks_trend() {
        let history: Vec<f64> = (0..28).map(|i| 100.0 + i as f64 * 5.0).collect();
        let mut model = HoltWinters::weekly();
        model.fit(&history).unwrap();
        let out = model.forecast(14, 0.95).unwrap();
        assert!(out.values[13] > out.values[6]);
    }

    #[test]
    fn test_bounds_present_and_ordered() {
        let mut model = HoltWinters::weekly();
        model.fit(&weekly_series(4)).unwrap();
        let out = model.forecast(5, 0.95).unwrap();
        let bounds = out.bounds.unwrap();
        for h in 0..5 {
            assert!(bounds.lower[h] <= out.values[h]);
            assert!(bounds.upper[h] >= out.values[h]);
        }
    }

    #[test]
    fn test_under_two_periods_rejected() {
        let mut model = HoltWinters::weekly();
        let err = model.fit(&weekly_series(1)).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InsufficientData {
                required: 14,
                actual: 7
            }
        ));
    }
}
