use async_trait::async_trait;
use serde::Deserialize;

use super::retry::retry_with_backoff;
use super::{DataError, DataResult, NewsArticle};

/// Source of recent articles for one instrument.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_articles(&self, symbol: &str) -> DataResult<Vec<NewsArticle>>;
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    articles: Option<Vec<NewsApiArticle>>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    source: NewsApiSource,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

pub struct HttpNewsSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpNewsSource {
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

    async fn fetch_page(&self, symbol: &str) -> DataResult<Vec<NewsArticle>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| DataError::Config("NEWS_API_KEY not configured".to_string()))?;

        let url = format!(
            "{}/v2/everything?q={}&sortBy=publishedAt&pageSize=20&apiKey={}",
            self.base_url, symbol, api_key
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
                format!("news request failed: {}", body),
            ));
        }

        let payload: NewsApiResponse = response.json().await?;
        if payload.status != "ok" {
            return Err(DataError::parse_error(format!(
                "unexpected news status: {}",
                payload.status
            )));
        }

        let articles = payload
            .articles
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                Some(NewsArticle {
                    title: a.title?,
                    description: a.description,
                    url: a.url,
                    source: a.source.name.unwrap_or_else(|| "unknown".to_string()),
                    published_at: a.published_at.unwrap_or_default(),
                })
            })
            .collect();

        Ok(articles)
    }
}

#[async_trait]
impl NewsSource for HttpNewsSource {
    async fn fetch_articles(&self, symbol: &str) -> DataResult<Vec<NewsArticle>> {
        tracing::info!("Fetching news for {}", symbol);
        retry_with_backoff(|| self.fetch_page(symbol), 2).await
    }
}
