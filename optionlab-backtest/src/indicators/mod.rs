//! Technical indicators.
//!
//! All indicators are pure functions over price slices returning one value
//! per input bar. `None` marks the warm-up period where there is not yet
//! enough history, so callers can reference an indicator from the first
//! bar of a session without special-casing.

pub mod momentum;
pub mod moving_average;
pub mod oscillators;
pub mod spec;
pub mod volatility;
pub mod volume;

use thiserror::Error;

use crate::data::Bar;
use rust_decimal::prelude::ToPrimitive;

pub use momentum::{adx, macd, momentum, rate_of_change, AdxResult, MacdResult};
pub use moving_average::{dema, ema, sma, tema, wma};
pub use oscillators::{cci, rsi, stochastic, williams_r, StochasticResult};
pub use spec::{IndicatorOutput, IndicatorSpec, PriceSource};
pub use volatility::{atr, bollinger_bands, keltner_channels, true_range, BandsResult};
pub use volume::{obv, vwap};

/// One indicator output line, aligned to its input.
pub type Line = Vec<Option<f64>>;

/// Result type alias for indicator calculations.
pub type Result<T> = std::result::Result<T, IndicatorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Data length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

impl IndicatorError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

/// Column view of a bar series.
#[derive(Debug, Clone, Default)]
pub struct Ohlcv {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Ohlcv {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let price = |d: rust_decimal::Decimal| d.to_f64().unwrap_or(f64::NAN);
        Self {
            open: bars.iter().map(|b| price(b.open)).collect(),
            high: bars.iter().map(|b| price(b.high)).collect(),
            low: bars.iter().map(|b| price(b.low)).collect(),
            close: bars.iter().map(|b| price(b.close)).collect(),
            volume: bars.iter().map(|b| b.volume as f64).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

pub(crate) fn check_period(name: &str, period: usize) -> Result<()> {
    if period == 0 {
        return Err(IndicatorError::invalid_parameter(format!(
            "{} period must be > 0",
            name
        )));
    }
    Ok(())
}

pub(crate) fn check_lengths(expected: usize, others: &[usize]) -> Result<()> {
    match others.iter().find(|&&len| len != expected) {
        Some(&actual) => Err(IndicatorError::LengthMismatch { expected, actual }),
        None => Ok(()),
    }
}

/// Lift raw prices into a line, treating non-finite values as missing.
pub(crate) fn defined(data: &[f64]) -> Line {
    data.iter()
        .map(|v| if v.is_finite() { Some(*v) } else { None })
        .collect()
}

/// Highest high and lowest low of the window ending at `end` (inclusive).
pub(crate) fn window_range(high: &[f64], low: &[f64], end: usize, period: usize) -> (f64, f64) {
    let start = end + 1 - period;
    let highest = high[start..=end].iter().copied().fold(f64::MIN, f64::max);
    let lowest = low[start..=end].iter().copied().fold(f64::MAX, f64::min);
    (highest, lowest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ohlcv_from_bars() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 18)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        let mut bar = Bar::flat(ts, dec!(100.5));
        bar.volume = 42;
        let ohlcv = Ohlcv::from_bars(&[bar]);
        assert_eq!(ohlcv.len(), 1);
        assert_eq!(ohlcv.close[0], 100.5);
        assert_eq!(ohlcv.volume[0], 42.0);
    }

    #[test]
    fn test_check_lengths() {
        assert!(check_lengths(3, &[3, 3]).is_ok());
        assert_eq!(
            check_lengths(3, &[3, 2]),
            Err(IndicatorError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        );
    }
}
