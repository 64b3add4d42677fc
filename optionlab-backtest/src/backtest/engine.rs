//! Core backtesting engine.
//!
//! Runs the simulation loop:
//! 1. Discover the trading calendar (spot dates with an eligible expiry)
//! 2. Simulate each day independently with a [`DaySimulator`]
//! 3. Record skipped days (missing session data) and keep going
//! 4. Build the equity curve and compute metrics over the full log
//!
//! Days carry no state between them, so they may be simulated in parallel;
//! the log is re-sorted by date before anything is aggregated.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{DataError, MarketData};
use crate::metrics::{MetricsCalculator, MetricsReport};
use crate::strategy::{ConfigError, StrategyConfig};

use super::brokerage::{BrokerageModel, CombinedExitBrokerage};
use super::day::DaySimulator;
use super::instrument::InstrumentSpec;
use super::leg::TriggerPrice;
use super::slippage::SlippageModel;
use super::trade::{equity_curve, EquityPoint, SkippedDay, TradeRecord};

/// Backtest errors. Both are raised before any day is simulated.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Calendar discovery failed: {0}")]
    Data(#[from] DataError),
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Lot size and strike step.
    pub instrument: InstrumentSpec,

    /// First trade date, inclusive.
    pub start_date: Option<NaiveDate>,

    /// Last trade date, inclusive.
    pub end_date: Option<NaiveDate>,

    /// Slippage model.
    pub slippage: SlippageModel,

    /// Brokerage model.
    pub brokerage: BrokerageModel,

    /// How a combined forced close is charged.
    pub combined_exit_brokerage: CombinedExitBrokerage,

    /// Which bar prices trigger stoploss/target.
    pub trigger_price: TriggerPrice,

    /// How far back a price lookup may reach for the latest bar.
    pub price_tolerance_minutes: u32,

    /// 0 = nearest expiry on or after the trade date.
    pub expiry_rank: usize,

    /// Annualization constant for Sharpe/Sortino/Calmar.
    pub trading_days_per_year: u32,

    /// Simulate days on the rayon pool.
    pub parallel_days: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentSpec::default(),
            start_date: None,
            end_date: None,
            slippage: SlippageModel::default(),
            brokerage: BrokerageModel::default(),
            combined_exit_brokerage: CombinedExitBrokerage::default(),
            trigger_price: TriggerPrice::default(),
            price_tolerance_minutes: 5,
            expiry_rank: 0,
            trading_days_per_year: 252,
            parallel_days: false,
        }
    }
}

impl BacktestConfig {
    /// Reject malformed run settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.instrument.validate()?;

        if self.slippage.pct < Decimal::ZERO || self.slippage.pct >= Decimal::ONE_HUNDRED {
            return Err(ConfigError::invalid(format!(
                "slippage pct must be in [0, 100), got {}",
                self.slippage.pct
            )));
        }
        if self.brokerage.per_order < Decimal::ZERO {
            return Err(ConfigError::invalid(format!(
                "brokerage per order must be >= 0, got {}",
                self.brokerage.per_order
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ConfigError::invalid(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }
        if self.trading_days_per_year == 0 {
            return Err(ConfigError::invalid("trading_days_per_year must be > 0"));
        }
        Ok(())
    }
}

/// Result of a completed backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Strategy simulated.
    pub strategy: StrategyConfig,

    /// Configuration used.
    pub config: BacktestConfig,

    /// One record per simulated day, chronological.
    pub trades: Vec<TradeRecord>,

    /// Daily equity curve.
    pub equity_curve: Vec<EquityPoint>,

    /// Days without session data.
    pub skipped_days: Vec<SkippedDay>,

    pub metrics: MetricsReport,

    /// The run was abandoned before the last day.
    pub cancelled: bool,
}

impl BacktestResult {
    /// First simulated date.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.trades.first().map(|t| t.date)
    }

    /// Last simulated date.
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.trades.last().map(|t| t.date)
    }

    pub fn net_pnl(&self) -> Decimal {
        self.metrics.net_pnl
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let range = match (self.start_date(), self.end_date()) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "no days simulated".to_string(),
        };
        format!(
            "Backtest Results: {} ({})\n\
             ----------------------------------------\n\
             Instrument: {} (lot {}, step {})\n\
             Skipped Days: {}{}\n\
             \n\
             {}",
            self.strategy.name,
            range,
            self.config.instrument.symbol,
            self.config.instrument.lot_size,
            self.config.instrument.strike_step,
            self.skipped_days.len(),
            if self.cancelled { " (cancelled)" } else { "" },
            self.metrics.summary(),
        )
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    strategy: StrategyConfig,
}

impl BacktestEngine {
    /// Create a new engine. Configuration problems fail here, before any
    /// simulation work.
    pub fn new(config: BacktestConfig, strategy: StrategyConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        strategy.validate()?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// Run over every trading date of `data`.
    pub fn run(&self, data: &MarketData) -> Result<BacktestResult, BacktestError> {
        self.run_with_cancel(data, &AtomicBool::new(false))
    }

    /// Run, checking `cancel` between days. A cancelled run returns the
    /// days completed so far.
    pub fn run_with_cancel(
        &self,
        data: &MarketData,
        cancel: &AtomicBool,
    ) -> Result<BacktestResult, BacktestError> {
        let dates = data.trading_dates(
            self.config.start_date,
            self.config.end_date,
            self.config.expiry_rank,
        )?;

        info!(
            strategy = %self.strategy.name,
            days = dates.len(),
            legs = self.strategy.legs.len(),
            "Starting backtest"
        );

        let simulator = DaySimulator::new(data, &self.strategy, &self.config);

        let mut outcomes: Vec<(NaiveDate, Result<TradeRecord, DataError>)> =
            if self.config.parallel_days {
                dates
                    .par_iter()
                    .filter(|_| !cancel.load(Ordering::Relaxed))
                    .map(|date| (*date, simulator.simulate(*date)))
                    .collect()
            } else {
                let mut outcomes = Vec::with_capacity(dates.len());
                for date in &dates {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    outcomes.push((*date, simulator.simulate(*date)));
                }
                outcomes
            };
        outcomes.sort_by_key(|(date, _)| *date);

        let cancelled = outcomes.len() < dates.len();
        let mut trades = Vec::with_capacity(outcomes.len());
        let mut skipped_days = Vec::new();
        for (date, outcome) in outcomes {
            match outcome {
                Ok(record) => trades.push(record),
                Err(e) => {
                    warn!(%date, error = %e, "Skipping day");
                    skipped_days.push(SkippedDay {
                        date,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let equity_curve = equity_curve(&trades);
        let metrics = MetricsCalculator::calculate(
            &trades,
            &equity_curve,
            self.config.trading_days_per_year,
        );

        info!(
            strategy = %self.strategy.name,
            simulated = trades.len(),
            skipped = skipped_days.len(),
            cancelled,
            net_pnl = %metrics.net_pnl,
            "Backtest complete"
        );

        Ok(BacktestResult {
            strategy: self.strategy.clone(),
            config: self.config.clone(),
            trades,
            equity_curve,
            skipped_days,
            metrics,
            cancelled,
        })
    }
}

/// Run several strategies concurrently over one shared store. Results keep
/// the order of `strategies`.
pub fn run_batch(
    config: &BacktestConfig,
    strategies: &[StrategyConfig],
    data: &MarketData,
) -> Vec<Result<BacktestResult, BacktestError>> {
    strategies
        .par_iter()
        .map(|strategy| BacktestEngine::new(config.clone(), strategy.clone())?.run(data))
        .collect()
}
