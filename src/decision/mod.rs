//! Decision fusion: combines the model's predicted return with the news
//! sentiment score into a buy/sell/hold action per instrument.
//!
//! Policy: both inputs are normalized into [0, 1] before weighting —
//! predicted returns by min-max over the current batch, sentiment by
//! (s + 1) / 2. The fused score buys above 0.6 and sells below 0.4; both
//! boundaries themselves hold. A batch of one (or an all-equal batch) has
//! no return spread, so its return term pins to the 0.5 midpoint by
//! design.

pub mod ledger;

pub use ledger::{Action, Decision, Ledger};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::DecisionConfig;
use crate::data::MarketDataSource;
use crate::features::FeatureEngine;
use crate::model::ModelStore;

const BUY_THRESHOLD: f64 = 0.6;
const SELL_THRESHOLD: f64 = 0.4;

/// Min-max scale fit over one batch of predicted returns.
#[derive(Debug, Clone, Copy)]
pub struct ReturnScale {
    min: f64,
    max: f64,
}

impl ReturnScale {
    pub fn fit(returns: &[f64]) -> Self {
        let min = returns.iter().copied().fold(f64::INFINITY, f64::min);
        let max = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { min, max }
    }

    /// Degenerate batches (single instrument, or no spread) normalize to
    /// the fixed midpoint.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if !span.is_finite() || span <= f64::EPSILON {
            0.5
        } else {
            ((value - self.min) / span).clamp(0.0, 1.0)
        }
    }
}

pub struct DecisionEngine {
    quant_weight: f64,
    qual_weight: f64,
}

impl DecisionEngine {
    pub fn new(config: &DecisionConfig) -> Result<Self> {
        Self::with_weights(config.quant_weight, config.qual_weight)
    }

    pub fn with_weights(quant_weight: f64, qual_weight: f64) -> Result<Self> {
        if ((quant_weight + qual_weight) - 1.0).abs() > 1e-9 {
            anyhow::bail!(
                "fusion weights must sum to 1.0 (got {} + {})",
                quant_weight,
                qual_weight
            );
        }
        Ok(Self {
            quant_weight,
            qual_weight,
        })
    }

    /// Fuse one instrument's inputs under a batch-fitted return scale.
    pub fn fuse(
        &self,
        scale: &ReturnScale,
        symbol: &str,
        predicted_return: f64,
        sentiment_score: f64,
    ) -> Decision {
        let norm_return = scale.normalize(predicted_return);
        let norm_sentiment = (sentiment_score.clamp(-1.0, 1.0) + 1.0) / 2.0;
        let decision_score =
            self.quant_weight * norm_return + self.qual_weight * norm_sentiment;

        Decision {
            symbol: symbol.to_string(),
            predicted_return,
            sentiment_score,
            decision_score,
            action: action_for(decision_score),
        }
    }

    /// One decision per instrument that has both a model and a sentiment
    /// score. Prediction failures and missing sentiment skip the
    /// instrument without failing the batch; the surviving rows form the
    /// normalization batch and the new ledger, which overwrites the
    /// previous run's file.
    pub async fn run_batch(
        &self,
        store: &ModelStore,
        market: &Arc<dyn MarketDataSource>,
        sentiments: &HashMap<String, f64>,
        lookback_days: u32,
        ledger_path: &Path,
    ) -> Result<Ledger> {
        let mut batch: Vec<(String, f64, f64)> = Vec::new();

        for entry in store.entries().context("listing model store")? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable model entry: {}", e);
                    continue;
                }
            };

            let predicted = match self.predict_latest(store, market, &entry, lookback_days).await
            {
                Ok(value) => value,
                Err(e) => {
                    error!("{}: prediction failed, skipping: {:#}", entry.symbol, e);
                    continue;
                }
            };
            info!(
                "{}: predicted next-period return {:.4}%",
                entry.symbol,
                predicted * 100.0
            );

            let sentiment = match sentiments.get(&entry.symbol) {
                Some(score) => *score,
                None => {
                    warn!("{}: no sentiment score, skipping", entry.symbol);
                    continue;
                }
            };

            batch.push((entry.symbol, predicted, sentiment));
        }

        let returns: Vec<f64> = batch.iter().map(|(_, r, _)| *r).collect();
        let scale = ReturnScale::fit(&returns);

        let rows: Vec<Decision> = batch
            .iter()
            .map(|(symbol, predicted, sentiment)| {
                let decision = self.fuse(&scale, symbol, *predicted, *sentiment);
                info!(
                    "{}: decision_score {:.3} -> {}",
                    symbol,
                    decision.decision_score,
                    decision.action.as_str()
                );
                decision
            })
            .collect();

        let ledger = Ledger::new(rows);
        ledger
            .write(ledger_path)
            .with_context(|| format!("writing ledger to {}", ledger_path.display()))?;
        info!(
            "Ledger written: {} decisions -> {}",
            ledger.len(),
            ledger_path.display()
        );

        Ok(ledger)
    }

    async fn predict_latest(
        &self,
        store: &ModelStore,
        market: &Arc<dyn MarketDataSource>,
        entry: &crate::model::ModelEntry,
        lookback_days: u32,
    ) -> Result<f64> {
        let artifact = store
            .load_path(&entry.path)
            .with_context(|| format!("loading model for {}", entry.symbol))?;
        let series = market
            .fetch_series(&entry.symbol, lookback_days)
            .await
            .context("fetching recent history")?;
        let frame = FeatureEngine::compute(&series).context("computing features")?;
        let latest = frame
            .latest_row()
            .context("no usable feature row after cleaning")?;
        let predicted = artifact.predict(latest)?;
        Ok(predicted)
    }
}

fn action_for(score: f64) -> Action {
    if score > BUY_THRESHOLD {
        Action::Buy
    } else if score < SELL_THRESHOLD {
        Action::Sell
    } else {
        Action::Hold
    }
}
