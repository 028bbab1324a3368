//! Held-out evaluation for trained return models.

use serde::{Deserialize, Serialize};

/// Thresholds reported as "fraction of predictions within ±x" of the
/// actual return.
pub const ACCURACY_THRESHOLDS: [f64; 2] = [0.01, 0.05];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub rmse: f64,
    /// Fraction of |error| <= 0.01.
    pub within_one_pct: f64,
    /// Fraction of |error| <= 0.05.
    pub within_five_pct: f64,
    pub test_rows: usize,
}

impl EvalReport {
    pub fn from_predictions(y_true: &[f64], y_pred: &[f64]) -> Self {
        debug_assert_eq!(y_true.len(), y_pred.len());
        let n = y_true.len();
        if n == 0 {
            return Self {
                rmse: f64::NAN,
                within_one_pct: 0.0,
                within_five_pct: 0.0,
                test_rows: 0,
            };
        }

        let rmse = mean_squared_error(y_true, y_pred).sqrt();
        let within = |threshold: f64| {
            y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| (*t - *p).abs() <= threshold)
                .count() as f64
                / n as f64
        };

        Self {
            rmse,
            within_one_pct: within(ACCURACY_THRESHOLDS[0]),
            within_five_pct: within(ACCURACY_THRESHOLDS[1]),
            test_rows: n,
        }
    }
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}
