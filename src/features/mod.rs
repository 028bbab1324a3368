//! Feature engineering: turns a cleaned OHLCV series into the fixed
//! 12-column indicator table the return models are trained on.
//!
//! Columns are computed over the full series first, then rows carrying any
//! non-finite required cell are dropped. Everything here is pure arithmetic
//! over the input series, so identical input yields identical output.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::{DataError, DataResult, PriceSeries};

/// Fixed feature column order. Persisted models record this order and
/// prediction inputs must match it.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "Return_Lag1",
    "Return_Lag2",
    "Return_Lag3",
    "Return_Lag4",
    "ROC_5",
    "MA_Return_5",
    "Volatility_5",
    "Volatility_10",
    "RSI",
    "OBV",
    "MACD",
    "MACD_Signal",
];

/// Rows required before any feature row can survive cleaning (RSI window
/// plus the longest lag).
pub const MIN_USABLE_ROWS: usize = 20;

/// Cleaned feature table for one instrument. `rows[i]` is ordered by
/// `FEATURE_COLUMNS`; `targets[i]` is the same-row daily return the models
/// regress against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest surviving feature row, used for live prediction.
    pub fn latest_row(&self) -> Option<&[f64]> {
        self.rows.last().map(|r| r.as_slice())
    }

    pub fn column_names() -> Vec<String> {
        FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect()
    }
}

pub struct FeatureEngine;

impl FeatureEngine {
    /// Compute the full cleaned feature table for a series.
    pub fn compute(series: &PriceSeries) -> DataResult<FeatureFrame> {
        if series.is_empty() {
            return Err(DataError::no_data(
                series.symbol.as_str(),
                "empty price series",
            ));
        }

        let closes = series.closes();
        let volumes = series.volumes();
        let n = closes.len();

        let daily_return = pct_change(&closes, 1);
        let lags: Vec<Vec<f64>> = (1..=4).map(|k| shift(&daily_return, k)).collect();
        let roc_5 = pct_change(&closes, 5);
        let ma_return_5 = rolling_mean(&daily_return, 5);
        let volatility_5 = rolling_std(&daily_return, 5);
        let volatility_10: Vec<f64> = rolling_std(&daily_return, 10)
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        let rsi: Vec<f64> = rsi(&closes, 14).into_iter().map(|v| v / 100.0).collect();
        let obv = pct_change(&on_balance_volume(&closes, &volumes), 1);
        let (macd, macd_signal) = macd(&closes, 12, 26, 9);

        let columns: [&[f64]; 12] = [
            &lags[0],
            &lags[1],
            &lags[2],
            &lags[3],
            &roc_5,
            &ma_return_5,
            &volatility_5,
            &volatility_10,
            &rsi,
            &obv,
            &macd,
            &macd_signal,
        ];

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        let mut targets = Vec::new();

        for i in 0..n {
            let row: Vec<f64> = columns.iter().map(|col| col[i]).collect();
            let target = daily_return[i];
            // ±inf counts as missing, same as NaN.
            if target.is_finite() && row.iter().all(|v| v.is_finite()) {
                dates.push(series.bars[i].date);
                rows.push(row);
                targets.push(target);
            }
        }

        if rows.is_empty() {
            return Err(DataError::InsufficientHistory {
                symbol: series.symbol.clone(),
                rows: 0,
                required: MIN_USABLE_ROWS,
            });
        }

        Ok(FeatureFrame {
            symbol: series.symbol.clone(),
            dates,
            rows,
            targets,
        })
    }
}

/// Percent change over `periods` steps. Leading entries and divisions by
/// zero come out non-finite and are cleaned later.
fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                (values[i] - values[i - periods]) / values[i - periods]
            }
        })
        .collect()
}

/// Shift a series forward by `k`, padding the head with NaN.
fn shift(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i < k { f64::NAN } else { values[i - k] })
        .collect()
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Rolling sample standard deviation (ddof = 1).
fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
        var.sqrt()
    })
}

fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let w = &values[i + 1 - window..=i];
            if w.iter().all(|v| v.is_finite()) {
                f(w)
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// RSI over a rolling window of simple average gains and losses. A window
/// with zero average loss saturates at 100; a flat window is undefined.
fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    (0..n)
        .map(|i| {
            let (g, l) = (avg_gain[i], avg_loss[i]);
            if !g.is_finite() || !l.is_finite() {
                return f64::NAN;
            }
            // g / 0 is +inf for g > 0 and NaN for g == 0; both flow through
            // the 100 - 100/(1+rs) form the way the source data demands.
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}

/// Cumulative signed volume, seeded at zero.
fn on_balance_volume(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut obv = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        obv[i] = if closes[i] > closes[i - 1] {
            obv[i - 1] + volumes[i]
        } else if closes[i] < closes[i - 1] {
            obv[i - 1] - volumes[i]
        } else {
            obv[i - 1]
        };
    }
    obv
}

/// Exponential moving average with alpha = 2/(span+1), seeded with the
/// first value and no bias correction.
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        if i == 0 {
            out.push(v);
        } else {
            out.push(alpha * v + (1.0 - alpha) * out[i - 1]);
        }
    }
    out
}

fn macd(
    closes: &[f64],
    short_span: usize,
    long_span: usize,
    signal_span: usize,
) -> (Vec<f64>, Vec<f64>) {
    let short_ema = ema(closes, short_span);
    let long_ema = ema(closes, long_span);
    let macd_line: Vec<f64> = short_ema
        .iter()
        .zip(long_ema.iter())
        .map(|(s, l)| s - l)
        .collect();
    let signal_line = ema(&macd_line, signal_span);
    (macd_line, signal_line)
}
