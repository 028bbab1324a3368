//! On-disk model artifacts, one JSON file per instrument.
//!
//! Files follow the `{symbol}_quant_model.json` pattern; existence of the
//! file is the cache-hit test. Writes go to a temp file in the same
//! directory and land via rename so a cancelled run never leaves a
//! half-written artifact.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::stacking::StackedEnsemble;
use super::{metrics::EvalReport, ModelError, ModelResult};

const MODEL_SUFFIX: &str = "_quant_model.json";

/// Span of history a model was fit on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: usize,
}

/// Immutable persisted model: the fitted stack plus the metadata needed to
/// feed it correctly at prediction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub symbol: String,
    pub feature_columns: Vec<String>,
    pub window: TrainingWindow,
    pub trained_at: DateTime<Utc>,
    pub eval: EvalReport,
    pub ensemble: StackedEnsemble,
}

impl ModelArtifact {
    /// Pure next-period return prediction for one feature row.
    pub fn predict(&self, features: &[f64]) -> ModelResult<f64> {
        if features.len() != self.feature_columns.len() {
            return Err(ModelError::Prediction(format!(
                "{}: expected {} features, got {}",
                self.symbol,
                self.feature_columns.len(),
                features.len()
            )));
        }
        Ok(self.ensemble.predict_one(features))
    }
}

pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}{}", symbol, MODEL_SUFFIX))
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.path_for(symbol).is_file()
    }

    pub fn load(&self, symbol: &str) -> ModelResult<ModelArtifact> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(ModelError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        self.load_path(&path)
    }

    pub fn load_path(&self, path: &Path) -> ModelResult<ModelArtifact> {
        let raw = fs::read_to_string(path)?;
        let artifact = serde_json::from_str(&raw)?;
        Ok(artifact)
    }

    /// Persist atomically: write to a temp sibling, then rename over the
    /// final path.
    pub fn save(&self, artifact: &ModelArtifact) -> ModelResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&artifact.symbol);
        let tmp = self
            .dir
            .join(format!(".{}.tmp-{}", artifact.symbol, uuid::Uuid::new_v4()));

        let raw = serde_json::to_string(artifact)?;
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Lazy listing of persisted models as (symbol, path) pairs. Files not
    /// matching the artifact pattern are skipped.
    pub fn entries(&self) -> ModelResult<ModelEntries> {
        let inner = fs::read_dir(&self.dir)?;
        Ok(ModelEntries { inner })
    }
}

/// Iterator over the store directory, yielding typed entries lazily.
pub struct ModelEntries {
    inner: fs::ReadDir,
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub symbol: String,
    pub path: PathBuf,
}

impl Iterator for ModelEntries {
    type Item = ModelResult<ModelEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir_entry = match self.inner.next()? {
                Ok(e) => e,
                Err(e) => return Some(Err(ModelError::Io(e))),
            };
            let path = dir_entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if let Some(symbol) = name.strip_suffix(MODEL_SUFFIX) {
                if !symbol.is_empty() && !symbol.starts_with('.') {
                    return Some(Ok(ModelEntry {
                        symbol: symbol.to_string(),
                        path,
                    }));
                }
            }
        }
    }
}
