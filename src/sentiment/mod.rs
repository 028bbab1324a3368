//! Sentiment aggregation: many articles per instrument reduced to one
//! score in [-1, 1], persisted as a CSV table consumed by the decision
//! engine. Classification is lexicon-based over title + body text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::data::{DataError, DataResult, NewsArticle, NewsSource};

/// Parallel article fetches in flight at once.
const MAX_CONCURRENT_FETCHES: usize = 4;

const POSITIVE_WORDS: &[&str] = &[
    "beat", "beats", "bullish", "buy", "gain", "gains", "growth", "outperform", "profit",
    "rally", "record", "soar", "soars", "strong", "surge", "upgrade", "upside", "wins",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "crash", "cut", "decline", "downgrade", "drop", "fall", "falls", "lawsuit",
    "loss", "losses", "miss", "misses", "plunge", "recall", "sell", "slump", "weak",
];

/// Per-article classification outcome. Ties and hit-free articles carry no
/// signal and are excluded from the average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleSentiment {
    Positive,
    Negative,
    Unclassified,
}

pub fn classify_article(text: &str) -> ArticleSentiment {
    let lower = text.to_lowercase();
    let mut positive = 0usize;
    let mut negative = 0usize;
    for word in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        if POSITIVE_WORDS.contains(&word) {
            positive += 1;
        }
        if NEGATIVE_WORDS.contains(&word) {
            negative += 1;
        }
    }
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => ArticleSentiment::Positive,
        std::cmp::Ordering::Less => ArticleSentiment::Negative,
        std::cmp::Ordering::Equal => ArticleSentiment::Unclassified,
    }
}

/// Average of the classified articles' ±1 scores; 0 when nothing
/// classifies. Always lands in [-1, 1].
pub fn score_articles(articles: &[NewsArticle]) -> f64 {
    let scores: Vec<f64> = articles
        .iter()
        .filter_map(|a| match classify_article(&a.text()) {
            ArticleSentiment::Positive => Some(1.0),
            ArticleSentiment::Negative => Some(-1.0),
            ArticleSentiment::Unclassified => None,
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SentimentRow {
    symbol: String,
    sentiment_score: f64,
}

pub struct SentimentAggregator {
    news: Arc<dyn NewsSource>,
    output_file: PathBuf,
}

impl SentimentAggregator {
    pub fn new(news: Arc<dyn NewsSource>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            news,
            output_file: output_file.into(),
        }
    }

    /// Refresh scores for every instrument and overwrite the sentiment
    /// table. A failed fetch scores that instrument 0 rather than failing
    /// the run.
    pub async fn refresh(&self, tickers: &[String]) -> DataResult<HashMap<String, f64>> {
        info!("Refreshing sentiment for {} instruments", tickers.len());

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
        let mut tasks: JoinSet<(String, f64)> = JoinSet::new();

        for ticker in tickers {
            let news = Arc::clone(&self.news);
            let permit_source = Arc::clone(&semaphore);
            let symbol = ticker.clone();
            tasks.spawn(async move {
                let _permit = permit_source.acquire_owned().await.ok();
                let score = match news.fetch_articles(&symbol).await {
                    Ok(articles) => {
                        let score = score_articles(&articles);
                        info!(
                            "{}: {} articles, sentiment {:.3}",
                            symbol,
                            articles.len(),
                            score
                        );
                        score
                    }
                    Err(e) => {
                        warn!("{}: news fetch failed ({}), scoring 0", symbol, e);
                        0.0
                    }
                };
                (symbol, score)
            });
        }

        let mut scores = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, score)) => {
                    scores.insert(symbol, score);
                }
                Err(e) => warn!("sentiment task panicked: {}", e),
            }
        }

        // Stable output order regardless of completion order.
        let ordered: Vec<(&String, f64)> = tickers
            .iter()
            .filter_map(|t| scores.get(t).map(|s| (t, *s)))
            .collect();
        write_scores(&self.output_file, &ordered)?;

        Ok(scores)
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }
}

fn write_scores(path: &Path, scores: &[(&String, f64)]) -> DataResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        for (symbol, score) in scores {
            writer.serialize(SentimentRow {
                symbol: (*symbol).clone(),
                sentiment_score: *score,
            })?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load the most recent sentiment table. A missing file means the last
/// aggregation never ran and every instrument counts as stale.
pub fn load_scores(path: &Path) -> DataResult<HashMap<String, f64>> {
    if !path.is_file() {
        return Err(DataError::Config(format!(
            "sentiment file not found: {}",
            path.display()
        )));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut scores = HashMap::new();
    for row in reader.deserialize() {
        let row: SentimentRow = row?;
        scores.insert(row.symbol, row.sentiment_score);
    }
    Ok(scores)
}
