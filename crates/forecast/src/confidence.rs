//! Prediction intervals from in-sample residuals.
//!
//! The standard error at step `h` is the residual standard deviation
//! scaled by `sqrt(h)`, so intervals widen with the horizon.

/// Symmetric bounds around each point forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Z multiplier for the common confidence levels.
pub fn z_score(confidence_level: f64) -> f64 {
    match confidence_level {
        x if x >= 0.99 => 2.576,
        x if x >= 0.95 => 1.96,
        x if x >= 0.90 => 1.645,
        x if x >= 0.80 => 1.282,
        _ => 1.96,
    }
}

/// Bounds for `forecast` from the fitted model's one-step residuals.
///
/// Returns `None` when there are no residuals to measure spread from.
pub fn bounds_from_residuals(
    forecast: &[f64],
    residuals: &[f64],
    confidence_level: f64,
) -> Option<Bounds> {
    if residuals.is_empty() {
        return None;
    }
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let variance = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let z = z_score(confidence_level);

    let mut lower = Vec::with_capacity(forecast.len());
    let mut upper = Vec::with_capacity(forecast.len());
    for (h, &point) in forecast.iter().enumerate() {
        let se = std_dev * ((h + 1) as f64).sqrt();
        lower.push(point - z * se);
        upper.push(point + z * se);
    }
    Some(Bounds { lower, upper })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_score_levels() {
        assert_eq!(z_score(0.95), 1.96);
        assert_eq!(z_score(0.99), 2.576);
        assert_eq!(z_score(0.90), 1.645);
        assert_eq!(z_score(0.5), 1.96);
    }

    #[test]
    fn test_bounds_widen_with_horizon() {
        let forecast = vec![100.0, 100.0, 100.0];
        let residuals = vec![-2.0, 2.0, -2.0, 2.0];
        let bounds = bounds_from_residuals(&forecast, &residuals, 0.95).unwrap();

        let width = |h: usize| bounds.upper[h] - bounds.lower[h];
        assert!(width(1) > width(0));
        assert!(width(2) > width(1));
        // step 1: se = sd * 1, sd = 2
        assert!((width(0) - 2.0 * 1.96 * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_residuals_no_bounds() {
        assert!(bounds_from_residuals(&[1.0], &[], 0.95).is_none());
    }
}
