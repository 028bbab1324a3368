//! Data layer: price history and news retrieval behind trait boundaries
//! plus the shared series types the rest of the pipeline consumes.

pub mod errors;
pub mod market;
pub mod news;
pub mod retry;

pub use errors::{DataError, DataResult};
pub use market::{HttpMarketData, MarketDataSource};
pub use news::{HttpNewsSource, NewsSource};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered daily price history for one instrument.
/// Timestamps are strictly increasing; rows may still be withdrawn later
/// during feature cleaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }
}

/// One news article attributed to an instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub published_at: String,
}

impl NewsArticle {
    /// Title and body text joined for classification.
    pub fn text(&self) -> String {
        match &self.description {
            Some(body) => format!("{} {}", self.title, body),
            None => self.title.clone(),
        }
    }
}

/// Read the newline-separated instrument universe.
pub fn load_tickers(path: &std::path::Path) -> DataResult<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    let tickers: Vec<String> = raw
        .lines()
        .map(|line| line.trim().to_uppercase())
        .filter(|line| !line.is_empty())
        .collect();
    if tickers.is_empty() {
        return Err(DataError::Config(format!(
            "No tickers found in {}",
            path.display()
        )));
    }
    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date"),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn series_sorts_and_dedupes_bars() {
        let series = PriceSeries::new("AAPL", vec![bar(3, 3.0), bar(1, 1.0), bar(3, 9.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![1.0, 3.0]);
    }

    #[test]
    fn load_tickers_normalizes_and_skips_blanks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tickers.txt");
        std::fs::write(&path, "aapl\n\n MSFT \nintc\n").expect("write");
        let tickers = load_tickers(&path).expect("load");
        assert_eq!(tickers, vec!["AAPL", "MSFT", "INTC"]);
    }
}
