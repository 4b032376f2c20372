//! Autoregression on the lag-7 seasonally differenced series.
//!
//! The weekly difference `d_t = y_t - y_{t-7}` strips the dominant
//! seasonal cycle; an AR(p) fit by Yule-Walker (solved with
//! Levinson-Durbin) models what is left, and the forecast re-integrates
//! against the trailing week of observations.

use tidecast_core::model::ModelKind;

use crate::confidence::bounds_from_residuals;
use crate::error::ModelError;
use crate::models::{check_finite, ForecastModel, ModelForecast};

const SEASON: usize = 7;

#[derive(Debug)]
pub struct SeasonalAr {
    order: usize,
    coeffs: Vec<f64>,
    mean: f64,
    /// Differenced series from the fit, tail of which seeds the
    /// recursive forecast.
    diffs: Vec<f64>,
    /// Trailing `SEASON` observations for re-integration.
    last_week: Vec<f64>,
    residuals: Vec<f64>,
    fitted: bool,
}

impl SeasonalAr {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            coeffs: Vec::new(),
            mean: 0.0,
            diffs: Vec::new(),
            last_week: Vec::new(),
            residuals: Vec::new(),
            fitted: false,
        }
    }

    /// AR(3) on weekly differences; the default for daily sales.
    pub fn weekly() -> Self {
        Self::new(3)
    }

    /// Yule-Walker estimate via Levinson-Durbin recursion.
    fn estimate_coefficients(&self, centered: &[f64]) -> Vec<f64> {
        let p = self.order;
        let n = centered.len();

        let mut autocov = vec![0.0; p + 1];
        for (k, cov) in autocov.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in k..n {
                sum += centered[i] * centered[i - k];
            }
            *cov = sum / n as f64;
        }

        let mut coeffs = vec![0.0; p];
        if autocov[0].abs() > 1e-10 {
            coeffs[0] = autocov[1] / autocov[0];
            for k in 1..p {
                let mut num = autocov[k + 1];
                for j in 0..k {
                    num -= coeffs[j] * autocov[k - j];
                }
                let mut denom = autocov[0];
                for j in 0..k {
                    denom -= coeffs[j] * autocov[j + 1];
                }
                if denom.abs() > 1e-10 {
                    let reflection = num / denom;
                    let prev = coeffs.clone();
                    coeffs[k] = reflection;
                    for j in 0..k {
                        coeffs[j] = prev[j] - reflection * prev[k - 1 - j];
                    }
                }
            }
        }
        coeffs
    }
}

impl ForecastModel for SeasonalAr {
    fn kind(&self) -> ModelKind {
        ModelKind::SeasonalAr
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelError> {
        // Two full seasons for the difference plus a window for the AR fit.
        let required = 2 * SEASON + self.order;
        if history.len() < required {
            return Err(ModelError::InsufficientData {
                required,
                actual: history.len(),
            });
        }
        check_finite(history)?;

        self.diffs = history
            .windows(SEASON + 1)
            .map(|w| w[SEASON] - w[0])
            .collect();
        let m = self.diffs.len();
        self.mean = self.diffs.iter().sum::<f64>() / m as f64;
        let centered: Vec<f64> = self.diffs.iter().map(|d| d - self.mean).collect();
        self.coeffs = self.estimate_coefficients(&centered);

        self.residuals.clear();
        for i in self.order..m {
            let mut pred = self.mean;
            for (j, &c) in self.coeffs.iter().enumerate() {
                pred += c * (self.diffs[i - j - 1] - self.mean);
            }
            self.residuals.push(self.diffs[i] - pred);
        }

        self.last_week = history[history.len() - SEASON..].to_vec();
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

        let mut extended = self.diffs.clone();
        let mut seasonal = self.last_week.clone();
        let mut values = Vec::with_capacity(horizon);

        for h in 0..horizon {
            let mut diff = self.mean;
            for (j, &c) in self.coeffs.iter().enumerate() {
                diff += c * (extended[extended.len() - j - 1] - self.mean);
            }
            extended.push(diff);

            // Re-integrate: this step's value sits one season above the
            // point seven days earlier.
            let value = seasonal[h] + diff;
            seasonal.push(value);
            values.push(value);
        }

        let bounds = bounds_from_residuals(&values, &self.residuals, confidence_level);
        Ok(ModelForecast { values, bounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_weekly_pattern_repeats() {
        // y_t depends only on the weekday, so the lag-7 difference is
        // identically zero and the forecast replays the last week.
        let week = [10.0, 20.0, 30.0, 40.0, 50.0, 90.0, 80.0];
        let history: Vec<f64> = (0..28).map(|i| week[i % 7]).collect();

        let mut model = SeasonalAr::weekly();
        model.fit(&history).unwrap();
        let out = model.forecast(14, 0.95).unwrap();

        for (h, &v) in out.values.iter().enumerate() {
            assert!((v - week[h % 7]).abs() < 1e-9, "step {h}: {v}");
        }
    }

    #[test]
    fn test_constant_weekly_growth() {
        // Every day sells SEASON more than the same day last week.
        let history: Vec<f64> = (0..35).map(|i| 100.0 + i as f64).collect();
        let mut model = SeasonalAr::weekly();
        model.fit(&history).unwrap();
        let out = model.forecast(7, 0.95).unwrap();

        for (h, &v) in out.values.iter().enumerate() {
            let expected = 100.0 + (35 + h) as f64;
            assert!((v - expected).abs() < 1.0, "step {h}: {v} vs {expected}");
        }
    }

    #[test]
    fn test_bounds_from_residuals() {
        let week = [10.0, 20.0, 30.0, 40.0, 50.0, 90.0, 80.0];
        let history: Vec<f64> = (0..35)
            .map(|i| week[i % 7] + if i % 2 == 0 { 1.5 } else { -1.5 })
            .collect();
        let mut model = SeasonalAr::weekly();
        model.fit(&history).unwrap();
        let out = model.forecast(3, 0.95).unwrap();
        let bounds = out.bounds.unwrap();
        for h in 0..3 {
            assert!(bounds.lower[h] <= out.values[h]);
            assert!(bounds.upper[h] >= out.values[h]);
        }
    }

    #[test]
    fn test_short_history_rejected() {
        let mut model = SeasonalAr::weekly();
        let err = model.fit(&[1.0; 10]).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { .. }));
    }
}
