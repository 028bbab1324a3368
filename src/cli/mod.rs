use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::context::AppContext;
use crate::data::load_tickers;
use crate::orchestrator::{jobs, Orchestrator};
use crate::sentiment;

#[derive(Parser)]
#[command(
    name = "tradewind",
    about = "Scheduled quant + sentiment trading signal engine",
    version = "0.1.0"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler in the foreground until interrupted
    Run,

    /// Train models for the universe (or one symbol)
    Train {
        /// Train only this symbol instead of the whole universe
        #[arg(short, long)]
        symbol: Option<String>,

        /// Rebuild even when a cached model exists
        #[arg(short, long)]
        force: bool,
    },

    /// Refresh news sentiment scores for the universe
    Sentiment,

    /// Fuse predictions with sentiment into a fresh decision ledger
    Decide,

    /// Execute the most recent decision ledger against the broker
    Execute,
}

/// How long `run` waits for in-flight jobs on shutdown.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(cli: Cli, ctx: Arc<AppContext>) -> Result<()> {
    match cli.command {
        Commands::Run => {
            let mut orchestrator = Orchestrator::new(Arc::clone(&ctx));
            orchestrator.start();
            info!("Scheduler running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, shutting down");
            orchestrator.stop(STOP_TIMEOUT).await;
        }

        Commands::Train { symbol, force } => {
            let symbols = match symbol {
                Some(symbol) => vec![symbol.to_uppercase()],
                None => load_tickers(&ctx.config.data.tickers_file)?,
            };
            jobs::train_symbols(&ctx, &symbols, force).await?;
        }

        Commands::Sentiment => {
            jobs::run_sentiment_refresh(Arc::clone(&ctx)).await?;
        }

        Commands::Decide => {
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
            info!("{} decisions written", ledger.len());
        }

        Commands::Execute => {
            let executor = ctx.trade_executor();
            let report = executor.execute(&ctx.config.decision.ledger_file).await?;
            info!(
                "{} orders submitted, {} failures",
                report.submitted(),
                report.failed()
            );
        }
    }

    Ok(())
}
