//! Decision batch behavior: fusion over a live model store, partial-data
//! skips, and the rising/falling two-instrument scenario.

mod common;

use std::collections::HashMap;

use common::{as_dyn_market, falling_closes, rising_closes, series_from_closes, CannedMarket};
use tradewind::decision::{Action, DecisionEngine, Ledger};
use tradewind::model::{ModelStore, SearchConfig, SignalModel};

fn fast_model(dir: &std::path::Path) -> SignalModel {
    SignalModel::with_store(
        ModelStore::new(dir),
        SearchConfig {
            iterations: 2,
            folds: 2,
            seed: 3,
        },
    )
}

/// Trains T1 on 40 bars of monotonically rising closes and T2 on falling
/// ones, returning the store directory.
fn trained_universe(dir: &std::path::Path) -> SignalModel {
    let model = fast_model(dir);
    let t1 = series_from_closes("T1", &rising_closes(40, 100.0));
    let t2 = series_from_closes("T2", &falling_closes(40, 200.0));
    model.get_or_train("T1", &t1, false).expect("train T1");
    model.get_or_train("T2", &t2, false).expect("train T2");
    model
}

#[tokio::test]
async fn rising_instrument_buys_falling_instrument_sells() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = trained_universe(dir.path());

    let market = as_dyn_market(CannedMarket::new(vec![
        series_from_closes("T1", &rising_closes(40, 100.0)),
        series_from_closes("T2", &falling_closes(40, 200.0)),
    ]));
    let sentiments: HashMap<String, f64> =
        [("T1".to_string(), 1.0), ("T2".to_string(), -1.0)].into();

    let ledger_path = dir.path().join("ledger.csv");
    let engine = DecisionEngine::with_weights(0.8, 0.2).expect("weights");
    let ledger = engine
        .run_batch(model.store(), &market, &sentiments, 60, &ledger_path)
        .await
        .expect("batch");

    assert_eq!(ledger.len(), 2);
    let t1 = ledger.rows.iter().find(|r| r.symbol == "T1").expect("T1");
    let t2 = ledger.rows.iter().find(|r| r.symbol == "T2").expect("T2");

    // T1 carries the batch's max predicted return and full-positive
    // sentiment: 0.8 * 1.0 + 0.2 * 1.0.
    assert!(t1.predicted_return > t2.predicted_return);
    assert_eq!(t1.action, Action::Buy);
    assert_eq!(t2.action, Action::Sell);

    // The ledger file reflects exactly this run.
    let persisted = Ledger::read(&ledger_path).expect("read back");
    assert_eq!(persisted.len(), 2);
}

#[tokio::test]
async fn missing_sentiment_excludes_the_instrument_without_failing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = trained_universe(dir.path());

    let market = as_dyn_market(CannedMarket::new(vec![
        series_from_closes("T1", &rising_closes(40, 100.0)),
        series_from_closes("T2", &falling_closes(40, 200.0)),
    ]));
    // Only T1 has a sentiment score; T2 must be skipped, not raised on.
    let sentiments: HashMap<String, f64> = [("T1".to_string(), 0.5)].into();

    let ledger_path = dir.path().join("ledger.csv");
    let engine = DecisionEngine::with_weights(0.85, 0.15).expect("weights");
    let ledger = engine
        .run_batch(model.store(), &market, &sentiments, 60, &ledger_path)
        .await
        .expect("batch");

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.rows[0].symbol, "T1");
}

#[tokio::test]
async fn fetch_failure_skips_the_instrument_and_batch_degenerates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = trained_universe(dir.path());

    // Market only knows T1; T2's fetch fails and is skipped.
    let market = as_dyn_market(CannedMarket::new(vec![series_from_closes(
        "T1",
        &rising_closes(40, 100.0),
    )]));
    let sentiments: HashMap<String, f64> =
        [("T1".to_string(), 0.0), ("T2".to_string(), 0.0)].into();

    let ledger_path = dir.path().join("ledger.csv");
    let engine = DecisionEngine::with_weights(0.85, 0.15).expect("weights");
    let ledger = engine
        .run_batch(model.store(), &market, &sentiments, 60, &ledger_path)
        .await
        .expect("batch");

    // Single surviving instrument: return term pins to the midpoint, so
    // the score is 0.85 * 0.5 + 0.15 * 0.5 = 0.5 -> Hold.
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.rows[0].symbol, "T1");
    assert!((ledger.rows[0].decision_score - 0.5).abs() < 1e-9);
    assert_eq!(ledger.rows[0].action, Action::Hold);
}

#[tokio::test]
async fn empty_store_produces_an_empty_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = fast_model(dir.path());
    std::fs::create_dir_all(dir.path()).expect("dir");

    let market = as_dyn_market(CannedMarket::new(vec![]));
    let sentiments: HashMap<String, f64> = HashMap::new();

    let ledger_path = dir.path().join("ledger.csv");
    let engine = DecisionEngine::with_weights(0.85, 0.15).expect("weights");
    let ledger = engine
        .run_batch(model.store(), &market, &sentiments, 60, &ledger_path)
        .await
        .expect("batch");

    assert!(ledger.is_empty());
    assert!(ledger_path.is_file());
}
