//! Job bodies dispatched by the orchestrator. Each one is a complete,
//! self-contained pass; per-instrument failures are logged and skipped so
//! a single bad ticker never sinks the batch.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::context::AppContext;
use crate::data::load_tickers;
use crate::model::TrainOutcome;
use crate::sentiment;

/// Refresh sentiment scores for the whole universe.
pub async fn run_sentiment_refresh(ctx: Arc<AppContext>) -> Result<()> {
    let tickers = load_tickers(&ctx.config.data.tickers_file)?;
    let aggregator = ctx.sentiment_aggregator();
    aggregator.refresh(&tickers).await?;
    Ok(())
}

/// Rebuild every instrument's model from fresh history.
pub async fn run_model_retrain(ctx: Arc<AppContext>) -> Result<()> {
    let tickers = load_tickers(&ctx.config.data.tickers_file)?;
    train_symbols(&ctx, &tickers, true).await
}

/// Train a set of instruments. Training is sequential per instrument,
/// which is what keeps writes to any one model file single-writer.
pub async fn train_symbols(ctx: &Arc<AppContext>, symbols: &[String], force: bool) -> Result<()> {
    let lookback = ctx.config.data.training_lookback_days;

    let mut trained = 0usize;
    let mut cached = 0usize;
    let mut skipped = 0usize;
    for symbol in symbols {
        let series = match ctx.market.fetch_series(symbol, lookback).await {
            Ok(series) => series,
            Err(e) => {
                error!("{}: history fetch failed, skipping: {}", symbol, e);
                skipped += 1;
                continue;
            }
        };

        let model = ctx.signal_model();
        let symbol_owned = symbol.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            model.get_or_train(&symbol_owned, &series, force)
        })
        .await
        .context("training task crashed")?;

        match outcome {
            Ok(TrainOutcome::Retrained(artifact)) => {
                info!(
                    "{}: model rebuilt (hold-out RMSE {:.6})",
                    symbol, artifact.eval.rmse
                );
                trained += 1;
            }
            Ok(TrainOutcome::CacheHit(_)) => {
                info!("{}: cached model is current", symbol);
                cached += 1;
            }
            Err(e) => {
                // Prior cached model, if any, remains authoritative.
                error!("{}: training failed, keeping previous model: {}", symbol, e);
                skipped += 1;
            }
        }
    }

    info!(
        "Training pass done: {} trained, {} cache hits, {} skipped",
        trained, cached, skipped
    );
    Ok(())
}

/// Full trade cycle: fuse the latest predictions with sentiment into a
/// fresh ledger, then execute it.
pub async fn run_trade_cycle(ctx: Arc<AppContext>) -> Result<()> {
    let sentiments = sentiment::load_scores(&ctx.config.decision.sentiment_file)?;

    let engine = ctx.decision_engine()?;
    let model = ctx.signal_model();
    let ledger = engine
        .run_batch(
            model.store(),
            &ctx.market,
            &sentiments,
            ctx.config.data.prediction_lookback_days,
            &ctx.config.decision.ledger_file,
        )
        .await?;

    if ledger.is_empty() {
        info!("No decisions survived fusion; nothing to execute");
        return Ok(());
    }

    let executor = ctx.trade_executor();
    let report = executor.execute(&ctx.config.decision.ledger_file).await?;
    info!(
        "Trade cycle finished: {} orders submitted of {} decisions",
        report.submitted(),
        report.outcomes.len()
    );
    Ok(())
}
