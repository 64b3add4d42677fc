//! Core market data types for intraday options backtesting.
//!
//! Bars are minute OHLCV records for either the spot underlying or a
//! single option contract. A contract is identified by its expiry, strike
//! and option type; a session is the slice of bars for one trading date.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    #[serde(alias = "CE", alias = "call", alias = "Call")]
    Call,
    #[serde(alias = "PE", alias = "put", alias = "Put")]
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CE" | "CALL" => Some(Self::Call),
            "P" | "PE" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Exchange suffix used in file names and symbols.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

/// A single OHLCV bar.
///
/// Option bars may carry open interest; spot bars never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub oi: Option<i64>,
}

impl Bar {
    /// Bar with all four prices equal, mostly useful for tests.
    pub fn flat(timestamp: NaiveDateTime, price: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            oi: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Check high >= max(open, close) and low <= min(open, close).
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.low >= Decimal::ZERO
    }
}

/// Identifies one option contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub option_type: OptionType,
}

impl ContractKey {
    pub fn new(expiry: NaiveDate, strike: Decimal, option_type: OptionType) -> Self {
        Self {
            expiry,
            strike: strike.normalize(),
            option_type,
        }
    }
}

impl std::fmt::Display for ContractKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}{}", self.expiry, self.strike, self.option_type.as_str())
    }
}

/// What a session of bars belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentSelector {
    Spot,
    Option(ContractKey),
}

/// Cache key for one instrument on one trading date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub date: NaiveDate,
    pub instrument: InstrumentSelector,
}

/// Bars of one instrument for one trading date, sorted by timestamp.
pub type Session = Arc<[Bar]>;

/// Find the bar stamped exactly at `ts`.
pub fn bar_at(bars: &[Bar], ts: NaiveDateTime) -> Option<&Bar> {
    bars.binary_search_by_key(&ts, |b| b.timestamp)
        .ok()
        .map(|idx| &bars[idx])
}

/// Find the latest bar at or before `ts`, no older than `tolerance`.
pub fn latest_bar(bars: &[Bar], ts: NaiveDateTime, tolerance: Duration) -> Option<&Bar> {
    let idx = bars.partition_point(|b| b.timestamp <= ts);
    if idx == 0 {
        return None;
    }
    let bar = &bars[idx - 1];
    if ts - bar.timestamp <= tolerance {
        Some(bar)
    } else {
        None
    }
}
