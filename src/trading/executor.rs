//! Trade execution: turns a decision ledger into broker orders, one
//! independent attempt per instrument.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::broker::{Broker, OrderSide, TimeInForce};
use crate::data::DataError;
use crate::decision::{Action, Ledger};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("broker credentials are not configured")]
    MissingCredentials,

    #[error("decision ledger not found at {path}")]
    MissingLedger { path: PathBuf },

    #[error("decision ledger could not be read: {0}")]
    LedgerUnreadable(#[from] DataError),
}

impl ExecutionError {
    /// Stable code per precondition class.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::MissingCredentials => "E_NO_CREDENTIALS",
            ExecutionError::MissingLedger { .. } => "E_NO_LEDGER",
            ExecutionError::LedgerUnreadable(_) => "E_BAD_LEDGER",
        }
    }
}

/// What happened to one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Submitted { order_id: String },
    SkippedNoPosition,
    Held,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    pub symbol: String,
    pub action: Action,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub outcomes: Vec<OrderOutcome>,
}

impl ExecutionReport {
    pub fn submitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OrderStatus::Submitted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OrderStatus::Failed { .. }))
            .count()
    }
}

pub struct TradeExecutor {
    broker: Option<Arc<dyn Broker>>,
    unit_quantity: u32,
}

impl TradeExecutor {
    /// `broker` is None when credentials were never configured; execution
    /// then refuses to start.
    pub fn new(broker: Option<Arc<dyn Broker>>, unit_quantity: u32) -> Self {
        Self {
            broker,
            unit_quantity: unit_quantity.max(1),
        }
    }

    /// Execute every decision in the ledger file. Preconditions abort the
    /// run before any order; per-instrument broker failures are recorded
    /// and never stop the remaining instruments.
    pub async fn execute(&self, ledger_path: &Path) -> Result<ExecutionReport, ExecutionError> {
        let broker = self
            .broker
            .as_ref()
            .ok_or(ExecutionError::MissingCredentials)?;
        if !ledger_path.is_file() {
            return Err(ExecutionError::MissingLedger {
                path: ledger_path.to_path_buf(),
            });
        }
        let ledger = Ledger::read(ledger_path)?;

        info!("Executing {} decisions", ledger.len());
        let mut outcomes = Vec::with_capacity(ledger.len());
        for row in &ledger.rows {
            let status = self.execute_one(broker.as_ref(), &row.symbol, row.action).await;
            outcomes.push(OrderOutcome {
                symbol: row.symbol.clone(),
                action: row.action,
                status,
            });
        }

        let report = ExecutionReport {
            run_id: Uuid::new_v4(),
            executed_at: Utc::now(),
            outcomes,
        };
        info!(
            "Execution complete: {} submitted, {} failed, {} total",
            report.submitted(),
            report.failed(),
            report.outcomes.len()
        );
        Ok(report)
    }

    async fn execute_one(&self, broker: &dyn Broker, symbol: &str, action: Action) -> OrderStatus {
        match action {
            Action::Buy => {
                match broker
                    .submit_market_order(symbol, self.unit_quantity, OrderSide::Buy, TimeInForce::Day)
                    .await
                {
                    Ok(receipt) => {
                        info!("{}: buy submitted ({})", symbol, receipt.id);
                        OrderStatus::Submitted {
                            order_id: receipt.id,
                        }
                    }
                    Err(e) => {
                        error!("{}: buy failed: {}", symbol, e);
                        OrderStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Action::Sell => {
                // Current holdings decide whether a sell makes sense;
                // fetched fresh on every run.
                let position = match broker.get_open_position(symbol).await {
                    Ok(position) => position,
                    Err(e) => {
                        error!("{}: position lookup failed: {}", symbol, e);
                        return OrderStatus::Failed {
                            reason: e.to_string(),
                        };
                    }
                };

                match position {
                    Some(p) if p.qty > 0.0 => {
                        match broker
                            .submit_market_order(
                                symbol,
                                self.unit_quantity,
                                OrderSide::Sell,
                                TimeInForce::Day,
                            )
                            .await
                        {
                            Ok(receipt) => {
                                info!("{}: sell submitted ({})", symbol, receipt.id);
                                OrderStatus::Submitted {
                                    order_id: receipt.id,
                                }
                            }
                            Err(e) => {
                                error!("{}: sell failed: {}", symbol, e);
                                OrderStatus::Failed {
                                    reason: e.to_string(),
                                }
                            }
                        }
                    }
                    _ => {
                        info!("{}: sell skipped, no shares held", symbol);
                        OrderStatus::SkippedNoPosition
                    }
                }
            }
            Action::Hold => {
                info!("{}: hold, no order", symbol);
                OrderStatus::Held
            }
        }
    }
}
