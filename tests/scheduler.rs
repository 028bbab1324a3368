//! Orchestrator behavior: job state machine, single-flight dispatch,
//! per-job failure isolation, and bounded shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{as_dyn_market, CannedMarket, NoNews};
use tradewind::config::Config;
use tradewind::context::AppContext;
use tradewind::orchestrator::{JobClass, JobState, Orchestrator};

/// Context whose paths live in a temp dir. The market source knows no
/// symbols and answers after `market_delay`, so retrain runs take a
/// controllable amount of time and then succeed with every ticker skipped.
fn test_context(dir: &tempfile::TempDir, market_delay: Option<Duration>) -> Arc<AppContext> {
    let mut config = Config::default();
    config.data.tickers_file = dir.path().join("tickers.txt");
    config.model.model_dir = dir.path().join("models");
    config.decision.ledger_file = dir.path().join("ledger.csv");
    config.decision.sentiment_file = dir.path().join("sentiment.csv");

    std::fs::write(&config.data.tickers_file, "SLOW\n").expect("tickers");

    let mut market = CannedMarket::new(vec![]);
    if let Some(delay) = market_delay {
        market = market.with_delay(delay);
    }

    Arc::new(AppContext::new(
        config,
        as_dyn_market(market),
        Arc::new(NoNews),
        None,
    ))
}

#[tokio::test]
async fn jobs_start_idle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = Orchestrator::new(test_context(&dir, None));

    for class in [
        JobClass::SentimentRefresh,
        JobClass::ModelRetrain,
        JobClass::TradeCycle,
    ] {
        assert_eq!(orchestrator.job_state(class), Some(JobState::Idle));
    }
}

#[tokio::test]
async fn failed_job_is_recorded_and_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(&dir, None);
    // No sentiment file exists, so the trade cycle fails its first step.
    let orchestrator = Orchestrator::new(ctx);

    let handle = orchestrator
        .trigger(JobClass::TradeCycle)
        .expect("dispatched");
    handle.await.expect("job task");

    assert_eq!(
        orchestrator.job_state(JobClass::TradeCycle),
        Some(JobState::Failed)
    );
    // Other classes are untouched.
    assert_eq!(
        orchestrator.job_state(JobClass::SentimentRefresh),
        Some(JobState::Idle)
    );
    assert_eq!(
        orchestrator.job_state(JobClass::ModelRetrain),
        Some(JobState::Idle)
    );
}

#[tokio::test]
async fn second_start_request_while_running_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(&dir, Some(Duration::from_millis(300)));
    let orchestrator = Orchestrator::new(ctx);

    let first = orchestrator
        .trigger(JobClass::ModelRetrain)
        .expect("first dispatch");
    // Give the spawned task a moment to take the single-flight lock.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(orchestrator.trigger(JobClass::ModelRetrain).is_none());
    assert_eq!(
        orchestrator.job_state(JobClass::ModelRetrain),
        Some(JobState::Running)
    );

    first.await.expect("job task");
    // Every ticker was skipped (fetch failed), which is still a success.
    assert_eq!(
        orchestrator.job_state(JobClass::ModelRetrain),
        Some(JobState::Succeeded)
    );

    // A new dispatch is accepted once the class is no longer in flight.
    let again = orchestrator
        .trigger(JobClass::ModelRetrain)
        .expect("redispatch");
    again.await.expect("job task");
}

#[tokio::test]
async fn failure_in_one_class_does_not_block_another() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(&dir, None);
    let orchestrator = Orchestrator::new(ctx);

    let failed = orchestrator
        .trigger(JobClass::TradeCycle)
        .expect("dispatched");
    failed.await.expect("job task");
    assert_eq!(
        orchestrator.job_state(JobClass::TradeCycle),
        Some(JobState::Failed)
    );

    let retrain = orchestrator
        .trigger(JobClass::ModelRetrain)
        .expect("dispatched");
    retrain.await.expect("job task");
    assert_eq!(
        orchestrator.job_state(JobClass::ModelRetrain),
        Some(JobState::Succeeded)
    );
}

#[tokio::test]
async fn start_twice_then_stop_within_bound() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(&dir, None);
    let mut orchestrator = Orchestrator::new(ctx);

    orchestrator.start();
    orchestrator.start(); // no-op

    let started = tokio::time::Instant::now();
    orchestrator.stop(Duration::from_secs(2)).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    // Stopping again is also a warned no-op.
    orchestrator.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn stop_waits_for_in_flight_jobs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(&dir, Some(Duration::from_millis(200)));
    let mut orchestrator = Orchestrator::new(ctx);
    orchestrator.start();

    orchestrator
        .trigger(JobClass::ModelRetrain)
        .expect("dispatched");
    tokio::time::sleep(Duration::from_millis(50)).await;

    orchestrator.stop(Duration::from_secs(2)).await;
    assert_eq!(
        orchestrator.job_state(JobClass::ModelRetrain),
        Some(JobState::Succeeded)
    );
}
