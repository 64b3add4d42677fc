pub mod backtest;
pub mod data;
pub mod indicators;
pub mod metrics;
pub mod report;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{
    BacktestConfig, BacktestEngine, BacktestError, BacktestResult, DaySimulator, ExitReason,
    InstrumentSpec, TradeRecord,
};
pub use data::{Bar, ContractKey, DataError, MarketData, OptionType};
pub use indicators::{IndicatorOutput, IndicatorSpec};
pub use metrics::{MetricsCalculator, MetricsReport};
pub use strategy::{Action, StrategyConfig, StrategyLeg, StrikeSelection};
