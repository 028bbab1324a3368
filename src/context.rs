//! Application wiring: one injected context object owns the configuration
//! and every external collaborator, so components never reach for globals
//! and tests can swap in canned sources.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::data::{HttpMarketData, HttpNewsSource, MarketDataSource, NewsSource};
use crate::decision::DecisionEngine;
use crate::model::SignalModel;
use crate::sentiment::SentimentAggregator;
use crate::trading::{AlpacaBroker, Broker, TradeExecutor};

pub struct AppContext {
    pub config: Config,
    pub market: Arc<dyn MarketDataSource>,
    pub news: Arc<dyn NewsSource>,
    pub broker: Option<Arc<dyn Broker>>,
}

impl AppContext {
    /// Wire the real HTTP collaborators from configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let timeout = config.data.http_timeout_seconds;
        let market: Arc<dyn MarketDataSource> = Arc::new(HttpMarketData::new(
            config.data.market_api_url.clone(),
            config.data.market_api_key.clone(),
            timeout,
        )?);
        let news: Arc<dyn NewsSource> = Arc::new(HttpNewsSource::new(
            config.data.news_api_url.clone(),
            config.data.news_api_key.clone(),
            timeout,
        )?);
        let broker = AlpacaBroker::from_config(&config.broker, timeout)
            .map(|b| Arc::new(b) as Arc<dyn Broker>);

        Ok(Self {
            config,
            market,
            news,
            broker,
        })
    }

    /// Direct injection, used by tests and alternate frontends.
    pub fn new(
        config: Config,
        market: Arc<dyn MarketDataSource>,
        news: Arc<dyn NewsSource>,
        broker: Option<Arc<dyn Broker>>,
    ) -> Self {
        Self {
            config,
            market,
            news,
            broker,
        }
    }

    pub fn signal_model(&self) -> SignalModel {
        SignalModel::new(&self.config.model)
    }

    pub fn sentiment_aggregator(&self) -> SentimentAggregator {
        SentimentAggregator::new(
            Arc::clone(&self.news),
            self.config.decision.sentiment_file.clone(),
        )
    }

    pub fn decision_engine(&self) -> Result<DecisionEngine> {
        DecisionEngine::new(&self.config.decision)
    }

    pub fn trade_executor(&self) -> TradeExecutor {
        TradeExecutor::new(self.broker.clone(), self.config.broker.unit_quantity)
    }
}
