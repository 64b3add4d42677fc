//! Backtesting engine for intraday multi-leg options strategies.
//!
//! This module provides the simulation stack:
//! - Per-leg state machine (entry, mark-to-market, stoploss/target/time exits)
//! - Per-day orchestration with combined stoploss/target
//! - Percentage slippage and flat per-order brokerage
//! - Trade records and the equity curve
//! - The run loop over the trading calendar

pub mod brokerage;
pub mod day;
pub mod engine;
pub mod instrument;
pub mod leg;
pub mod slippage;
pub mod trade;

pub use brokerage::{BrokerageModel, CombinedExitBrokerage};
pub use day::DaySimulator;
pub use engine::{run_batch, BacktestConfig, BacktestEngine, BacktestError, BacktestResult};
pub use instrument::InstrumentSpec;
pub use leg::{LegSimulator, LegState, TriggerPrice};
pub use slippage::{Fill, SlippageModel};
pub use trade::{
    equity_curve, EquityPoint, ExitReason, LegFailure, LegPosition, SkippedDay, TradeRecord,
};
