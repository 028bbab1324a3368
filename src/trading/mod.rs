//! Broker boundary and the position-aware trade executor.

pub mod broker;
pub mod executor;

pub use broker::{
    AlpacaBroker, Broker, BrokerError, BrokerResult, OrderReceipt, OrderSide, Position,
    TimeInForce,
};
pub use executor::{ExecutionError, ExecutionReport, OrderOutcome, OrderStatus, TradeExecutor};
