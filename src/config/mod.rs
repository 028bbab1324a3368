use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub decision: DecisionConfig,
    pub broker: BrokerConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub market_api_url: String,
    pub market_api_key: Option<String>,
    pub news_api_url: String,
    pub news_api_key: Option<String>,
    /// Calendar days of history pulled for live prediction.
    pub prediction_lookback_days: u32,
    /// Calendar days of history pulled for training.
    pub training_lookback_days: u32,
    pub http_timeout_seconds: u64,
    /// Path to the newline-separated instrument universe.
    pub tickers_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding one persisted artifact per instrument.
    pub model_dir: PathBuf,
    /// Random-search draws per base learner.
    pub search_iterations: usize,
    /// Contiguous folds used for CV scoring and stacking.
    pub cv_folds: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub quant_weight: f64,
    pub qual_weight: f64,
    pub ledger_file: PathBuf,
    pub sentiment_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Shares per market order.
    pub unit_quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Weekday hour (America/New_York) for the sentiment refresh.
    pub sentiment_hour: u32,
    /// Saturday hour for the weekly retrain.
    pub retrain_hour: u32,
    /// Daily hour for decision + execution.
    pub trade_hour: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Config {
            data: DataConfig {
                market_api_url: env::var("MARKET_API_URL")
                    .unwrap_or_else(|_| "https://api.polygon.io".to_string()),
                market_api_key: env::var("MARKET_API_KEY").ok(),
                news_api_url: env::var("NEWS_API_URL")
                    .unwrap_or_else(|_| "https://newsapi.org".to_string()),
                news_api_key: env::var("NEWS_API_KEY").ok(),
                prediction_lookback_days: parse_env("PREDICTION_LOOKBACK_DAYS", 60)?,
                training_lookback_days: parse_env("TRAINING_LOOKBACK_DAYS", 730)?,
                http_timeout_seconds: parse_env("HTTP_TIMEOUT_SECONDS", 30)?,
                tickers_file: env::var("TICKERS_FILE")
                    .unwrap_or_else(|_| "tickers.txt".to_string())
                    .into(),
            },
            model: ModelConfig {
                model_dir: env::var("MODEL_DIR")
                    .unwrap_or_else(|_| "models".to_string())
                    .into(),
                search_iterations: parse_env("SEARCH_ITERATIONS", 20)?,
                cv_folds: parse_env("CV_FOLDS", 3)?,
                seed: parse_env("MODEL_SEED", 42)?,
            },
            decision: DecisionConfig {
                quant_weight: parse_env("QUANT_WEIGHT", 0.85)?,
                qual_weight: parse_env("QUAL_WEIGHT", 0.15)?,
                ledger_file: env::var("LEDGER_FILE")
                    .unwrap_or_else(|_| "buy_sell_decisions.csv".to_string())
                    .into(),
                sentiment_file: env::var("SENTIMENT_FILE")
                    .unwrap_or_else(|_| "sentiment_scores.csv".to_string())
                    .into(),
            },
            broker: BrokerConfig {
                base_url: env::var("BROKER_BASE_URL")
                    .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string()),
                api_key: env::var("BROKER_API_KEY").ok(),
                api_secret: env::var("BROKER_API_SECRET").ok(),
                unit_quantity: parse_env("UNIT_QUANTITY", 1)?,
            },
            schedule: ScheduleConfig {
                sentiment_hour: parse_env("SENTIMENT_HOUR", 4)?,
                retrain_hour: parse_env("RETRAIN_HOUR", 10)?,
                trade_hour: parse_env("TRADE_HOUR", 9)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Fusion weights must form a convex combination.
    pub fn validate(&self) -> Result<()> {
        let sum = self.decision.quant_weight + self.decision.qual_weight;
        if (sum - 1.0).abs() > 1e-9 {
            anyhow::bail!(
                "QUANT_WEIGHT + QUAL_WEIGHT must sum to 1.0 (got {})",
                sum
            );
        }
        if self.model.cv_folds < 2 {
            anyhow::bail!("CV_FOLDS must be at least 2");
        }
        for hour in [
            self.schedule.sentiment_hour,
            self.schedule.retrain_hour,
            self.schedule.trade_hour,
        ] {
            if hour > 23 {
                anyhow::bail!("schedule hours must be in 0..=23 (got {})", hour);
            }
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                market_api_url: "https://api.polygon.io".to_string(),
                market_api_key: None,
                news_api_url: "https://newsapi.org".to_string(),
                news_api_key: None,
                prediction_lookback_days: 60,
                training_lookback_days: 730,
                http_timeout_seconds: 30,
                tickers_file: "tickers.txt".into(),
            },
            model: ModelConfig {
                model_dir: "models".into(),
                search_iterations: 20,
                cv_folds: 3,
                seed: 42,
            },
            decision: DecisionConfig {
                quant_weight: 0.85,
                qual_weight: 0.15,
                ledger_file: "buy_sell_decisions.csv".into(),
                sentiment_file: "sentiment_scores.csv".into(),
            },
            broker: BrokerConfig {
                base_url: "https://paper-api.alpaca.markets".to_string(),
                api_key: None,
                api_secret: None,
                unit_quantity: 1,
            },
            schedule: ScheduleConfig {
                sentiment_hour: 4,
                retrain_hour: 10,
                trade_hour: 9,
            },
        }
    }
}
