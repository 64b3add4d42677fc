//! Trade records produced by the simulator.
//!
//! One [`TradeRecord`] per simulated day, holding one [`LegPosition`] per
//! configured leg. Records are append-only and consumed read-only by the
//! metrics calculator and the exporters.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::OptionType;
use crate::strategy::Action;

/// Reason a leg (or the whole day) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Configured exit time reached.
    Time,
    /// Per-leg stoploss breached.
    Stoploss,
    /// Per-leg target reached.
    Target,
    /// Forced close by the combined stoploss/target.
    CombinedExit,
    /// The leg could not be entered.
    DataMissing,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Time => "TIME",
            ExitReason::Stoploss => "STOPLOSS",
            ExitReason::Target => "TARGET",
            ExitReason::CombinedExit => "COMBINED_EXIT",
            ExitReason::DataMissing => "DATA_MISSING",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a leg failed to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegFailure {
    /// No spot price near the entry time to resolve the strike.
    SpotMissing,
    /// The resolved strike has no series for the day.
    StrikeUnavailable,
    /// The contract has no bar near the entry time.
    NoEntryPrice,
}

impl LegFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegFailure::SpotMissing => "SPOT_MISSING",
            LegFailure::StrikeUnavailable => "STRIKE_UNAVAILABLE",
            LegFailure::NoEntryPrice => "NO_ENTRY_PRICE",
        }
    }
}

/// Outcome of one leg for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPosition {
    pub leg_index: usize,
    pub option_type: OptionType,
    pub action: Action,
    /// Lots times lot size.
    pub quantity: u32,
    pub strike: Option<Decimal>,
    pub entry_time: Option<NaiveDateTime>,
    /// Market price at entry.
    pub entry_price: Option<Decimal>,
    /// Price after slippage.
    pub entry_fill: Option<Decimal>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_price: Option<Decimal>,
    pub exit_fill: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub failure: Option<LegFailure>,
    /// Mark-to-market P&L at market prices.
    pub gross_pnl: Decimal,
    pub slippage: Decimal,
    pub brokerage: Decimal,
    pub net_pnl: Decimal,
}

impl LegPosition {
    /// Whether the leg was ever opened.
    pub fn entered(&self) -> bool {
        self.entry_time.is_some()
    }
}

/// One simulated trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub expiry: Option<NaiveDate>,
    pub legs: Vec<LegPosition>,
    pub gross_pnl: Decimal,
    /// Total brokerage, including any basket order.
    pub brokerage: Decimal,
    pub slippage: Decimal,
    pub net_pnl: Decimal,
    /// `COMBINED_EXIT` when triggered, otherwise the last leg to close.
    pub exit_reason: Option<ExitReason>,
    /// A leg failed to enter or was closed at a stale price.
    pub partial_data: bool,
    /// Entry filters rejected the day.
    pub entry_filtered: bool,
}

impl TradeRecord {
    /// A record with no positions.
    pub fn empty(date: NaiveDate, expiry: Option<NaiveDate>) -> Self {
        Self {
            date,
            expiry,
            legs: Vec::new(),
            gross_pnl: Decimal::ZERO,
            brokerage: Decimal::ZERO,
            slippage: Decimal::ZERO,
            net_pnl: Decimal::ZERO,
            exit_reason: None,
            partial_data: false,
            entry_filtered: false,
        }
    }

    /// Whether any leg was opened.
    pub fn traded(&self) -> bool {
        self.legs.iter().any(LegPosition::entered)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }

    pub fn is_loser(&self) -> bool {
        self.net_pnl < Decimal::ZERO
    }
}

/// Equity after one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    /// Distance below the running peak (peak starts at zero).
    pub drawdown: Decimal,
}

/// Build the equity curve from chronologically ordered records.
pub fn equity_curve(trades: &[TradeRecord]) -> Vec<EquityPoint> {
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;

    trades
        .iter()
        .map(|t| {
            cumulative += t.net_pnl;
            peak = peak.max(cumulative);
            EquityPoint {
                date: t.date,
                daily_pnl: t.net_pnl,
                cumulative_pnl: cumulative,
                drawdown: peak - cumulative,
            }
        })
        .collect()
}

/// A day that was not simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDay {
    pub date: NaiveDate,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(day: u32, pnl: Decimal) -> TradeRecord {
        TradeRecord {
            net_pnl: pnl,
            ..TradeRecord::empty(NaiveDate::from_ymd_opt(2024, 1, day).unwrap(), None)
        }
    }

    #[test]
    fn test_exit_reason_names() {
        assert_eq!(ExitReason::CombinedExit.to_string(), "COMBINED_EXIT");
        assert_eq!(
            serde_json::to_string(&ExitReason::DataMissing).unwrap(),
            "\"DATA_MISSING\""
        );
        let reason: ExitReason = serde_json::from_str("\"STOPLOSS\"").unwrap();
        assert_eq!(reason, ExitReason::Stoploss);
    }

    #[test]
    fn test_equity_curve() {
        let trades = vec![
            record(1, dec!(100)),
            record(2, dec!(-150)),
            record(3, dec!(30)),
            record(4, dec!(200)),
        ];
        let curve = equity_curve(&trades);
        let cumulative: Vec<Decimal> = curve.iter().map(|p| p.cumulative_pnl).collect();
        assert_eq!(cumulative, vec![dec!(100), dec!(-50), dec!(-20), dec!(180)]);
        let drawdown: Vec<Decimal> = curve.iter().map(|p| p.drawdown).collect();
        assert_eq!(drawdown, vec![dec!(0), dec!(150), dec!(120), dec!(0)]);
    }

    #[test]
    fn test_initial_loss_is_drawdown_from_zero() {
        let curve = equity_curve(&[record(1, dec!(-40))]);
        assert_eq!(curve[0].drawdown, dec!(40));
    }

    #[test]
    fn test_empty_record() {
        let r = TradeRecord::empty(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), None);
        assert!(!r.traded());
        assert!(!r.is_winner() && !r.is_loser());
    }
}
