//! Performance metrics module.
//!
//! Provides performance calculations over the daily trade log:
//! - Win rate, profit factor, expectancy
//! - Sharpe ratio, Sortino ratio, Calmar ratio
//! - Maximum drawdown and its duration
//! - Monthly P&L, exit reason counts

pub mod calculator;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, MetricsReport, MonthlyPnl};
