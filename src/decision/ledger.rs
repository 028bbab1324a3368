//! Decision ledger: the persisted table of per-instrument decisions for
//! one orchestration cycle. Overwritten atomically on every run; rows keep
//! the order they were processed in.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::DataResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "Buy",
            Action::Sell => "Sell",
            Action::Hold => "Hold",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "instrument_id")]
    pub symbol: String,
    pub predicted_return: f64,
    pub sentiment_score: f64,
    pub decision_score: f64,
    pub action: Action,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub rows: Vec<Decision>,
}

impl Ledger {
    pub fn new(rows: Vec<Decision>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Overwrite the ledger file for this run. Written to a temp sibling
    /// first so a cancelled run never leaves a torn table behind.
    pub fn write(&self, path: &Path) -> DataResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            for row in &self.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> DataResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(Self { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(symbol: &str, action: Action) -> Decision {
        Decision {
            symbol: symbol.to_string(),
            predicted_return: 0.01,
            sentiment_score: 0.5,
            decision_score: 0.7,
            action,
        }
    }

    #[test]
    fn write_then_read_round_trips_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("buy_sell_decisions.csv");

        let ledger = Ledger::new(vec![
            decision("AAPL", Action::Buy),
            decision("INTC", Action::Sell),
            decision("MSFT", Action::Hold),
        ]);
        ledger.write(&path).expect("write");

        let loaded = Ledger::read(&path).expect("read");
        let symbols: Vec<&str> = loaded.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "INTC", "MSFT"]);
        assert_eq!(loaded.rows[0].action, Action::Buy);
    }

    #[test]
    fn header_uses_instrument_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.csv");
        Ledger::new(vec![decision("AAPL", Action::Buy)])
            .write(&path)
            .expect("write");

        let raw = std::fs::read_to_string(&path).expect("raw");
        let header = raw.lines().next().expect("header");
        assert_eq!(
            header,
            "instrument_id,predicted_return,sentiment_score,decision_score,action"
        );
    }

    #[test]
    fn rewriting_overwrites_the_previous_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.csv");

        Ledger::new(vec![decision("AAPL", Action::Buy), decision("INTC", Action::Hold)])
            .write(&path)
            .expect("first write");
        Ledger::new(vec![decision("MSFT", Action::Sell)])
            .write(&path)
            .expect("second write");

        let loaded = Ledger::read(&path).expect("read");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.rows[0].symbol, "MSFT");
    }
}
