//! Per-instrument return models: training, caching, and prediction.
//!
//! Training runs a randomized hyperparameter search for two tree-ensemble
//! base learners, stacks them under a linear meta-model, evaluates on a
//! chronological hold-out, and persists the result. A persisted model is
//! authoritative until a forced rebuild supersedes it.

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod search;
pub mod stacking;
pub mod store;
pub mod tree;

pub use metrics::EvalReport;
pub use search::SearchConfig;
pub use store::{ModelArtifact, ModelEntry, ModelStore, TrainingWindow};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::config::ModelConfig;
use crate::data::PriceSeries;
use crate::features::{FeatureEngine, FeatureFrame, MIN_USABLE_ROWS};
use stacking::StackedEnsemble;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No model found for {symbol}")]
    NotFound { symbol: String },

    #[error("Training failed for {symbol}: {message}")]
    Training { symbol: String, message: String },

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// How a model was obtained. Callers that must distinguish a cache read
/// from a fresh fit match on this instead of inspecting side effects.
#[derive(Debug)]
pub enum TrainOutcome {
    CacheHit(ModelArtifact),
    Retrained(ModelArtifact),
}

impl TrainOutcome {
    pub fn artifact(&self) -> &ModelArtifact {
        match self {
            TrainOutcome::CacheHit(a) | TrainOutcome::Retrained(a) => a,
        }
    }

    pub fn into_artifact(self) -> ModelArtifact {
        match self {
            TrainOutcome::CacheHit(a) | TrainOutcome::Retrained(a) => a,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self, TrainOutcome::CacheHit(_))
    }
}

/// Fraction of cleaned rows used for training; the chronological tail is
/// held out for evaluation.
const TRAIN_FRACTION: f64 = 0.8;

pub struct SignalModel {
    store: ModelStore,
    search: SearchConfig,
}

impl SignalModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            store: ModelStore::new(&config.model_dir),
            search: SearchConfig {
                iterations: config.search_iterations,
                folds: config.cv_folds,
                seed: config.seed,
            },
        }
    }

    pub fn with_store(store: ModelStore, search: SearchConfig) -> Self {
        Self { store, search }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Return the persisted model for `symbol` unchanged, or train, persist
    /// and return a fresh one. Only one retrain per instrument may run at a
    /// time; the orchestrator's sequential training loop guarantees that.
    pub fn get_or_train(
        &self,
        symbol: &str,
        series: &PriceSeries,
        force_rebuild: bool,
    ) -> ModelResult<TrainOutcome> {
        if !force_rebuild && self.store.exists(symbol) {
            info!("Loading cached model for {}", symbol);
            return Ok(TrainOutcome::CacheHit(self.store.load(symbol)?));
        }

        let artifact = self.train(symbol, series)?;
        self.store.save(&artifact)?;
        Ok(TrainOutcome::Retrained(artifact))
    }

    fn train(&self, symbol: &str, series: &PriceSeries) -> ModelResult<ModelArtifact> {
        let frame = FeatureEngine::compute(series).map_err(|e| ModelError::Training {
            symbol: symbol.to_string(),
            message: e.to_string(),
        })?;

        if frame.len() < MIN_USABLE_ROWS {
            return Err(ModelError::Training {
                symbol: symbol.to_string(),
                message: format!(
                    "only {} usable rows after cleaning, need {}",
                    frame.len(),
                    MIN_USABLE_ROWS
                ),
            });
        }

        info!(
            "Training model for {} on {} rows ({} search draws, {} folds)",
            symbol,
            frame.len(),
            self.search.iterations,
            self.search.folds
        );

        let split = split_index(frame.len());
        let (train_x, test_x) = frame.rows.split_at(split);
        let (train_y, test_y) = frame.targets.split_at(split);

        let boost_params = search::tune_boost(train_x, train_y, &self.search);
        let forest_params = search::tune_forest(train_x, train_y, &self.search);
        info!(?boost_params, ?forest_params, "{}: best parameters", symbol);

        let ensemble = StackedEnsemble::fit(
            train_x,
            train_y,
            boost_params,
            forest_params,
            self.search.folds,
        );

        let predictions = ensemble.predict(test_x);
        let eval = EvalReport::from_predictions(test_y, &predictions);
        info!(
            "{}: hold-out RMSE {:.6}, {:.1}% within ±0.01, {:.1}% within ±0.05",
            symbol,
            eval.rmse,
            eval.within_one_pct * 100.0,
            eval.within_five_pct * 100.0
        );

        Ok(ModelArtifact {
            symbol: symbol.to_string(),
            feature_columns: FeatureFrame::column_names(),
            window: TrainingWindow {
                start: frame.dates[0],
                end: frame.dates[frame.len() - 1],
                rows: frame.len(),
            },
            trained_at: Utc::now(),
            eval,
            ensemble,
        })
    }
}

/// Chronological 80/20 boundary, always leaving at least one test row.
fn split_index(n: usize) -> usize {
    (((n as f64) * TRAIN_FRACTION) as usize).clamp(1, n - 1)
}
