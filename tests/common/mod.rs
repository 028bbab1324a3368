//! Shared fixtures: canned data sources and a scriptable broker.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tradewind::data::{
    Bar, DataError, DataResult, MarketDataSource, NewsArticle, NewsSource, PriceSeries,
};
use tradewind::trading::{
    Broker, BrokerError, BrokerResult, OrderReceipt, OrderSide, Position, TimeInForce,
};

/// Daily series with the given closes, dated consecutively.
pub fn series_from_closes(symbol: &str, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date")
                + chrono::Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 10_000.0 + 13.0 * i as f64,
        })
        .collect();
    PriceSeries::new(symbol, bars)
}

pub fn rising_closes(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64).collect()
}

pub fn falling_closes(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start - i as f64).collect()
}

/// Market source serving canned series, with an optional artificial delay
/// so in-flight behavior can be observed.
pub struct CannedMarket {
    series: HashMap<String, PriceSeries>,
    pub delay: Option<Duration>,
}

impl CannedMarket {
    pub fn new(series: Vec<PriceSeries>) -> Self {
        Self {
            series: series.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MarketDataSource for CannedMarket {
    async fn fetch_series(&self, symbol: &str, _days: u32) -> DataResult<PriceSeries> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.series
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::no_data(symbol, "not in fixture"))
    }
}

/// News source that always errors; sentiment falls back to zero scores.
pub struct NoNews;

#[async_trait]
impl NewsSource for NoNews {
    async fn fetch_articles(&self, symbol: &str) -> DataResult<Vec<NewsArticle>> {
        Err(DataError::no_data(symbol, "no feed in fixture"))
    }
}

pub fn article(title: &str, body: &str) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        description: Some(body.to_string()),
        url: None,
        source: "fixture".to_string(),
        published_at: "2024-06-01T12:00:00Z".to_string(),
    }
}

/// News source serving canned articles per symbol.
pub struct CannedNews {
    articles: HashMap<String, Vec<NewsArticle>>,
}

impl CannedNews {
    pub fn new(articles: Vec<(&str, Vec<NewsArticle>)>) -> Self {
        Self {
            articles: articles
                .into_iter()
                .map(|(symbol, list)| (symbol.to_string(), list))
                .collect(),
        }
    }
}

#[async_trait]
impl NewsSource for CannedNews {
    async fn fetch_articles(&self, symbol: &str) -> DataResult<Vec<NewsArticle>> {
        Ok(self.articles.get(symbol).cloned().unwrap_or_default())
    }
}

/// Unsize a concrete mock into the executor's trait-object slot.
pub fn as_dyn_broker(broker: &std::sync::Arc<MockBroker>) -> std::sync::Arc<dyn Broker> {
    std::sync::Arc::clone(broker) as std::sync::Arc<dyn Broker>
}

pub fn as_dyn_market(market: CannedMarket) -> std::sync::Arc<dyn MarketDataSource> {
    std::sync::Arc::new(market)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Order {
        symbol: String,
        side: OrderSide,
        quantity: u32,
        time_in_force: TimeInForce,
    },
    PositionLookup {
        symbol: String,
    },
}

/// Scriptable broker: positions per symbol, optional rejection list, and a
/// call log for assertions.
#[derive(Default)]
pub struct MockBroker {
    positions: HashMap<String, f64>,
    reject: Vec<String>,
    pub calls: Mutex<Vec<BrokerCall>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, symbol: &str, qty: f64) -> Self {
        self.positions.insert(symbol.to_string(), qty);
        self
    }

    pub fn rejecting(mut self, symbol: &str) -> Self {
        self.reject.push(symbol.to_string());
        self
    }

    pub fn orders(&self) -> Vec<BrokerCall> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| matches!(c, BrokerCall::Order { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn submit_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: OrderSide,
        time_in_force: TimeInForce,
    ) -> BrokerResult<OrderReceipt> {
        if self.reject.contains(&symbol.to_string()) {
            return Err(BrokerError::Rejected {
                status_code: 403,
                message: format!("{} is not tradable in fixture", symbol),
            });
        }
        self.calls.lock().expect("calls lock").push(BrokerCall::Order {
            symbol: symbol.to_string(),
            side,
            quantity,
            time_in_force,
        });
        Ok(OrderReceipt {
            id: format!("order-{}", symbol),
            symbol: symbol.to_string(),
            status: "accepted".to_string(),
        })
    }

    async fn get_open_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(BrokerCall::PositionLookup {
                symbol: symbol.to_string(),
            });
        match self.positions.get(symbol) {
            Some(&qty) => Ok(Some(Position {
                symbol: symbol.to_string(),
                qty,
            })),
            None => Ok(None),
        }
    }
}
