//! Broker boundary: market-order submission and open-position lookup
//! against an Alpaca-style paper trading REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::BrokerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderReceipt {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(deserialize_with = "qty_from_string")]
    pub qty: f64,
}

fn qty_from_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Alpaca returns quantities as strings.
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Order rejected: {message} (status: {status_code})")]
    Rejected { status_code: u16, message: String },

    #[error("Broker response could not be parsed: {0}")]
    Parse(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Remote brokerage operations the executor depends on. Positions are
/// always fetched fresh; nothing here caches.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn submit_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: OrderSide,
        time_in_force: TimeInForce,
    ) -> BrokerResult<OrderReceipt>;

    /// Ok(None) when the broker holds no position for the symbol.
    async fn get_open_position(&self, symbol: &str) -> BrokerResult<Option<Position>>;
}

#[derive(Debug, Serialize)]
struct MarketOrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: TimeInForce,
}

pub struct AlpacaBroker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl AlpacaBroker {
    /// None when API credentials are not configured; the executor treats
    /// that as its missing-credentials precondition.
    pub fn from_config(config: &BrokerConfig, timeout_seconds: u64) -> Option<Self> {
        let (api_key, api_secret) = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => (key.clone(), secret.clone()),
            _ => {
                warn!("broker credentials not configured");
                return None;
            }
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .user_agent("tradewind/0.1.0")
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            api_secret,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }
}

#[async_trait]
impl Broker for AlpacaBroker {
    async fn submit_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: OrderSide,
        time_in_force: TimeInForce,
    ) -> BrokerResult<OrderReceipt> {
        let url = format!("{}/v2/orders", self.base_url);
        let body = MarketOrderRequest {
            symbol,
            qty: quantity.to_string(),
            side,
            order_type: "market",
            time_in_force,
        };

        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BrokerError::Rejected {
                status_code,
                message,
            });
        }

        response
            .json::<OrderReceipt>()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))
    }

    async fn get_open_position(&self, symbol: &str) -> BrokerResult<Option<Position>> {
        let url = format!("{}/v2/positions/{}", self.base_url, symbol);

        let response = self.authed(self.client.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BrokerError::Rejected {
                status_code,
                message,
            });
        }

        let position = response
            .json::<Position>()
            .await
            .map_err(|e| BrokerError::Parse(e.to_string()))?;
        Ok(Some(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_both_credentials() {
        let mut config = BrokerConfig {
            base_url: "https://paper-api.alpaca.markets".to_string(),
            api_key: Some("key".to_string()),
            api_secret: None,
            unit_quantity: 1,
        };
        assert!(AlpacaBroker::from_config(&config, 10).is_none());

        config.api_secret = Some("secret".to_string());
        assert!(AlpacaBroker::from_config(&config, 10).is_some());
    }

    #[test]
    fn order_sides_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderSide::Buy).expect("json"),
            "\"buy\""
        );
        assert_eq!(
            serde_json::to_string(&TimeInForce::Day).expect("json"),
            "\"day\""
        );
    }

    #[test]
    fn position_qty_parses_from_string_payload() {
        let position: Position =
            serde_json::from_str("{\"symbol\":\"AAPL\",\"qty\":\"3\"}").expect("json");
        assert_eq!(position.qty, 3.0);
    }
}
