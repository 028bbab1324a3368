use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use super::retry::retry_with_backoff;
use super::{Bar, DataError, DataResult, PriceSeries};

/// Source of daily price history. An empty result is a fetch error, never an
/// empty series.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_series(&self, symbol: &str, days: u32) -> DataResult<PriceSeries>;
}

/// Polygon-style aggregates response
#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    results: Option<Vec<Aggregate>>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct Aggregate {
    #[serde(rename = "t")]
    timestamp_ms: i64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

pub struct HttpMarketData {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMarketData {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_seconds: u64,
    ) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .user_agent("tradewind/0.1.0")
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn fetch_aggregates(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DataResult<Vec<Bar>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            DataError::Config("MARKET_API_KEY not configured".to_string())
        })?;

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&apiKey={}",
            self.base_url, symbol, start, end, api_key
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DataError::api_error(
                status,
                format!("aggregates request failed: {}", body),
            ));
        }

        let payload: AggregatesResponse = response.json().await?;
        if payload.status != "OK" && payload.status != "DELAYED" {
            return Err(DataError::parse_error(format!(
                "unexpected aggregates status: {}",
                payload.status
            )));
        }

        let bars = payload
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|agg| {
                let date = chrono::DateTime::from_timestamp_millis(agg.timestamp_ms)
                    .map(|dt| dt.date_naive())?;
                Some(Bar {
                    date,
                    open: agg.open,
                    high: agg.high,
                    low: agg.low,
                    close: agg.close,
                    volume: agg.volume,
                })
            })
            .collect();

        Ok(bars)
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    async fn fetch_series(&self, symbol: &str, days: u32) -> DataResult<PriceSeries> {
        tracing::info!("Fetching {} days of history for {}", days, symbol);

        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(days));

        let bars = retry_with_backoff(|| self.fetch_aggregates(symbol, start, end), 2).await?;

        if bars.is_empty() {
            return Err(DataError::no_data(symbol, "source returned no bars"));
        }

        tracing::debug!("{}: {} bars received", symbol, bars.len());
        Ok(PriceSeries::new(symbol, bars))
    }
}
