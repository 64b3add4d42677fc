//! Performance metrics calculator.
//!
//! A pure function of the trade log and equity curve. Every ratio fails
//! closed: a zero denominator or too small a sample yields `0.0` instead
//! of an error. The one exception is profit factor, which is infinite when
//! there are profits and no losses.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::backtest::{EquityPoint, ExitReason, TradeRecord};

/// Full metrics report for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    // Day counts
    pub total_days: usize,
    pub traded_days: usize,
    pub winning_days: usize,
    pub losing_days: usize,
    pub filtered_days: usize,
    pub partial_days: usize,
    pub win_rate: f64,

    // P&L
    pub net_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64,
    pub avg_day_pnl: Decimal,
    pub avg_winner: Decimal,
    pub avg_loser: Decimal,
    pub largest_winner: Decimal,
    pub largest_loser: Decimal,
    pub expectancy: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // Returns and risk
    pub annualized_return: f64,
    pub max_drawdown: Decimal,
    pub max_drawdown_date: Option<NaiveDate>,
    pub drawdown_duration_days: i64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Costs
    pub total_brokerage: Decimal,
    pub total_slippage: Decimal,

    pub exit_reasons: BTreeMap<ExitReason, usize>,
    pub monthly: Vec<MonthlyPnl>,
}

impl Default for MetricsReport {
    fn default() -> Self {
        Self {
            total_days: 0,
            traded_days: 0,
            winning_days: 0,
            losing_days: 0,
            filtered_days: 0,
            partial_days: 0,
            win_rate: 0.0,
            net_pnl: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            profit_factor: 0.0,
            avg_day_pnl: Decimal::ZERO,
            avg_winner: Decimal::ZERO,
            avg_loser: Decimal::ZERO,
            largest_winner: Decimal::ZERO,
            largest_loser: Decimal::ZERO,
            expectancy: 0.0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            annualized_return: 0.0,
            max_drawdown: Decimal::ZERO,
            max_drawdown_date: None,
            drawdown_duration_days: 0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            total_brokerage: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
            exit_reasons: BTreeMap::new(),
            monthly: Vec::new(),
        }
    }
}

impl MetricsReport {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Days: {} (traded: {}, W: {}, L: {}, filtered: {}, partial: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {:.2}\n\
             \n\
             Net P&L: {:.2}\n\
             Avg Day: {:.2}\n\
             Avg Winner: {:.2}\n\
             Avg Loser: {:.2}\n\
             Largest Win: {:.2}\n\
             Largest Loss: {:.2}\n\
             Expectancy: {:.2}\n\
             Streaks: {} wins / {} losses\n\
             \n\
             Annualized Return: {:.2}\n\
             Max Drawdown: {:.2} ({} days)\n\
             Sharpe Ratio: {:.2}\n\
             Sortino Ratio: {:.2}\n\
             Calmar Ratio: {:.2}\n\
             \n\
             Brokerage: {:.2}\n\
             Slippage: {:.2}",
            self.total_days,
            self.traded_days,
            self.winning_days,
            self.losing_days,
            self.filtered_days,
            self.partial_days,
            self.win_rate * 100.0,
            self.profit_factor,
            self.net_pnl,
            self.avg_day_pnl,
            self.avg_winner,
            self.avg_loser,
            self.largest_winner,
            self.largest_loser,
            self.expectancy,
            self.max_consecutive_wins,
            self.max_consecutive_losses,
            self.annualized_return,
            self.max_drawdown,
            self.drawdown_duration_days,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.calmar_ratio,
            self.total_brokerage,
            self.total_slippage,
        )
    }
}

/// Drawdown scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown: Decimal,
    pub max_drawdown_date: Option<NaiveDate>,
    /// Longest stretch below a prior peak, in calendar days.
    pub duration_days: i64,
}

/// P&L of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPnl {
    pub year: i32,
    pub month: u32,
    pub pnl: Decimal,
    pub days: usize,
    pub winning_days: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from the trade log and equity curve.
    pub fn calculate(
        trades: &[TradeRecord],
        equity_curve: &[EquityPoint],
        trading_days_per_year: u32,
    ) -> MetricsReport {
        if trades.is_empty() {
            return MetricsReport::default();
        }

        let total_days = trades.len();
        let winning_days = trades.iter().filter(|t| t.is_winner()).count();
        let losing_days = trades.iter().filter(|t| t.is_loser()).count();
        let decided = winning_days + losing_days;
        let win_rate = ratio(winning_days as f64, decided as f64);

        let net_pnl: Decimal = trades.iter().map(|t| t.net_pnl).sum();
        let gross_profit: Decimal = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.net_pnl)
            .sum();
        let gross_loss: Decimal = trades
            .iter()
            .filter(|t| t.is_loser())
            .map(|t| t.net_pnl)
            .sum();

        let avg_winner = mean_decimal(gross_profit, winning_days);
        let avg_loser = mean_decimal(gross_loss, losing_days);
        let expectancy = if decided > 0 {
            let loss_rate = losing_days as f64 / decided as f64;
            win_rate * to_f64(avg_winner) + loss_rate * to_f64(avg_loser)
        } else {
            0.0
        };
        let (max_consecutive_wins, max_consecutive_losses) = Self::streaks(trades);

        let returns: Vec<f64> = trades.iter().map(|t| to_f64(t.net_pnl)).collect();
        let periods = f64::from(trading_days_per_year);
        let annualized_return = returns.iter().mean() * periods;

        let drawdown = Self::analyze_drawdown(equity_curve);
        let max_drawdown = to_f64(drawdown.max_drawdown);

        let mut exit_reasons = BTreeMap::new();
        for reason in trades.iter().filter_map(|t| t.exit_reason) {
            *exit_reasons.entry(reason).or_insert(0) += 1;
        }

        MetricsReport {
            total_days,
            traded_days: trades.iter().filter(|t| t.traded()).count(),
            winning_days,
            losing_days,
            filtered_days: trades.iter().filter(|t| t.entry_filtered).count(),
            partial_days: trades.iter().filter(|t| t.partial_data).count(),
            win_rate,
            net_pnl,
            gross_profit,
            gross_loss,
            profit_factor: Self::profit_factor(gross_profit, gross_loss),
            avg_day_pnl: mean_decimal(net_pnl, total_days),
            avg_winner,
            avg_loser,
            largest_winner: trades
                .iter()
                .map(|t| t.net_pnl)
                .filter(|p| *p > Decimal::ZERO)
                .max()
                .unwrap_or(Decimal::ZERO),
            largest_loser: trades
                .iter()
                .map(|t| t.net_pnl)
                .filter(|p| *p < Decimal::ZERO)
                .min()
                .unwrap_or(Decimal::ZERO),
            expectancy,
            max_consecutive_wins,
            max_consecutive_losses,
            annualized_return,
            max_drawdown: drawdown.max_drawdown,
            max_drawdown_date: drawdown.max_drawdown_date,
            drawdown_duration_days: drawdown.duration_days,
            sharpe_ratio: Self::sharpe(&returns, trading_days_per_year),
            sortino_ratio: Self::sortino(&returns, trading_days_per_year),
            calmar_ratio: ratio(annualized_return, max_drawdown),
            total_brokerage: trades.iter().map(|t| t.brokerage).sum(),
            total_slippage: trades.iter().map(|t| t.slippage).sum(),
            exit_reasons,
            monthly: Self::monthly_pnl(trades),
        }
    }

    /// Gross profit over absolute gross loss.
    pub fn profit_factor(gross_profit: Decimal, gross_loss: Decimal) -> f64 {
        let loss = to_f64(gross_loss.abs());
        let profit = to_f64(gross_profit);
        if loss == 0.0 {
            return if profit > 0.0 { f64::INFINITY } else { 0.0 };
        }
        profit / loss
    }

    /// Annualized Sharpe ratio of daily returns (risk-free rate 0, sample
    /// standard deviation).
    pub fn sharpe(returns: &[f64], trading_days_per_year: u32) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let mean = returns.iter().mean();
        let std_dev = returns.iter().std_dev();
        annualize(ratio(mean, std_dev), trading_days_per_year)
    }

    /// Annualized Sortino ratio: mean return over the sample standard
    /// deviation of the negative returns.
    pub fn sortino(returns: &[f64], trading_days_per_year: u32) -> f64 {
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        if returns.len() < 2 || downside.len() < 2 {
            return 0.0;
        }
        let mean = returns.iter().mean();
        let downside_dev = downside.iter().std_dev();
        annualize(ratio(mean, downside_dev), trading_days_per_year)
    }

    /// Single forward scan over cumulative P&L. The running peak starts at
    /// zero so an opening loss counts as drawdown.
    pub fn analyze_drawdown(equity_curve: &[EquityPoint]) -> DrawdownAnalysis {
        let mut peak = Decimal::ZERO;
        let mut peak_date = equity_curve.first().map(|p| p.date);
        let mut underwater_since: Option<NaiveDate> = None;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_date = None;
        let mut longest = 0i64;

        for point in equity_curve {
            if point.cumulative_pnl >= peak {
                if let Some(start) = underwater_since.take() {
                    longest = longest.max((point.date - start).num_days());
                }
                peak = point.cumulative_pnl;
                peak_date = Some(point.date);
            } else {
                if underwater_since.is_none() {
                    underwater_since = peak_date;
                }
                let drawdown = peak - point.cumulative_pnl;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                    max_drawdown_date = Some(point.date);
                }
            }
        }

        if let (Some(start), Some(last)) = (underwater_since, equity_curve.last()) {
            longest = longest.max((last.date - start).num_days());
        }

        DrawdownAnalysis {
            max_drawdown,
            max_drawdown_date,
            duration_days: longest,
        }
    }

    /// Longest runs of winning and losing days. A flat day ends both.
    fn streaks(trades: &[TradeRecord]) -> (usize, usize) {
        let (mut wins, mut losses) = (0usize, 0usize);
        let (mut max_wins, mut max_losses) = (0usize, 0usize);
        for trade in trades {
            if trade.is_winner() {
                wins += 1;
                losses = 0;
            } else if trade.is_loser() {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            max_wins = max_wins.max(wins);
            max_losses = max_losses.max(losses);
        }
        (max_wins, max_losses)
    }

    /// Net P&L per calendar month, chronological.
    pub fn monthly_pnl(trades: &[TradeRecord]) -> Vec<MonthlyPnl> {
        let mut months: BTreeMap<(i32, u32), MonthlyPnl> = BTreeMap::new();
        for trade in trades {
            let (year, month) = (trade.date.year(), trade.date.month());
            let entry = months.entry((year, month)).or_insert(MonthlyPnl {
                year,
                month,
                pnl: Decimal::ZERO,
                days: 0,
                winning_days: 0,
            });
            entry.pnl += trade.net_pnl;
            entry.days += 1;
            if trade.is_winner() {
                entry.winning_days += 1;
            }
        }
        months.into_values().collect()
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `numerator / denominator`, or 0 when the result is not finite.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn annualize(value: f64, trading_days_per_year: u32) -> f64 {
    value * f64::from(trading_days_per_year).sqrt()
}

fn mean_decimal(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    total / Decimal::from(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::equity_curve;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn record(day: u32, pnl: Decimal) -> TradeRecord {
        TradeRecord {
            net_pnl: pnl,
            exit_reason: Some(ExitReason::Time),
            ..TradeRecord::empty(NaiveDate::from_ymd_opt(2024, 1, day).unwrap(), None)
        }
    }

    fn calculate(trades: &[TradeRecord]) -> MetricsReport {
        MetricsCalculator::calculate(trades, &equity_curve(trades), 252)
    }

    #[test]
    fn test_profit_factor() {
        assert_eq!(MetricsCalculator::profit_factor(dec!(15000), dec!(-5000)), 3.0);
        assert_eq!(
            MetricsCalculator::profit_factor(dec!(100), dec!(0)),
            f64::INFINITY
        );
        assert_eq!(MetricsCalculator::profit_factor(dec!(0), dec!(0)), 0.0);
    }

    #[test]
    fn test_empty_log_is_all_sentinels() {
        let report = calculate(&[]);
        assert_eq!(report, MetricsReport::default());
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.profit_factor, 0.0);
    }

    #[test]
    fn test_all_zero_days() {
        let trades: Vec<_> = (1..=5).map(|d| record(d, dec!(0))).collect();
        let report = calculate(&trades);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.profit_factor, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.sortino_ratio, 0.0);
        assert_eq!(report.calmar_ratio, 0.0);
        assert_eq!(report.max_drawdown, dec!(0));
    }

    #[test]
    fn test_single_day() {
        let report = calculate(&[record(1, dec!(500))]);
        assert_eq!(report.net_pnl, dec!(500));
        assert_eq!(report.win_rate, 1.0);
        assert_eq!(report.profit_factor, f64::INFINITY);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.sortino_ratio, 0.0);
    }

    #[test]
    fn test_win_rate_ignores_flat_days() {
        let trades = vec![
            record(1, dec!(100)),
            record(2, dec!(0)),
            record(3, dec!(-50)),
            record(4, dec!(100)),
        ];
        let report = calculate(&trades);
        assert_relative_eq!(report.win_rate, 2.0 / 3.0);
        assert_eq!(report.gross_profit, dec!(200));
        assert_eq!(report.gross_loss, dec!(-50));
        assert_eq!(report.profit_factor, 4.0);
        assert_eq!(report.avg_winner, dec!(100));
        assert_eq!(report.avg_loser, dec!(-50));
        assert_eq!(report.avg_day_pnl, dec!(37.5));
        // 2/3 * 100 + 1/3 * -50
        assert_relative_eq!(report.expectancy, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sharpe_uses_sample_std() {
        // mean 2, sample std 1
        let sharpe = MetricsCalculator::sharpe(&[1.0, 2.0, 3.0], 252);
        assert_relative_eq!(sharpe, 2.0 * 252f64.sqrt(), epsilon = 1e-9);
        assert_eq!(MetricsCalculator::sharpe(&[5.0, 5.0, 5.0], 252), 0.0);
    }

    #[test]
    fn test_sortino_needs_two_negative_days() {
        assert_eq!(MetricsCalculator::sortino(&[10.0, -5.0, 20.0], 252), 0.0);
        // mean 1, downside [-2, -4] sample std sqrt(2)
        let sortino = MetricsCalculator::sortino(&[7.0, -2.0, -4.0, 3.0], 1);
        assert_relative_eq!(sortino, 1.0 / 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_drawdown_scan() {
        let trades = vec![
            record(1, dec!(100)),
            record(2, dec!(-150)),
            record(3, dec!(30)),
            record(5, dec!(200)),
            record(8, dec!(-10)),
        ];
        let curve = equity_curve(&trades);
        let analysis = MetricsCalculator::analyze_drawdown(&curve);
        assert_eq!(analysis.max_drawdown, dec!(150));
        assert_eq!(
            analysis.max_drawdown_date,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        // Peak on the 1st, recovered on the 5th.
        assert_eq!(analysis.duration_days, 4);
        assert!(analysis.max_drawdown >= Decimal::ZERO);
    }

    #[test]
    fn test_opening_loss_is_drawdown() {
        let curve = equity_curve(&[record(1, dec!(-40)), record(2, dec!(10))]);
        let analysis = MetricsCalculator::analyze_drawdown(&curve);
        assert_eq!(analysis.max_drawdown, dec!(40));
    }

    #[test]
    fn test_streaks_and_exit_reasons() {
        let trades = vec![
            record(1, dec!(10)),
            record(2, dec!(10)),
            record(3, dec!(-5)),
            record(4, dec!(-5)),
            record(5, dec!(-5)),
            record(6, dec!(10)),
        ];
        let report = calculate(&trades);
        assert_eq!(report.max_consecutive_wins, 2);
        assert_eq!(report.max_consecutive_losses, 3);
        assert_eq!(report.exit_reasons.get(&ExitReason::Time), Some(&6));
    }

    #[test]
    fn test_monthly_pnl() {
        let mut feb = record(1, dec!(-20));
        feb.date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let trades = vec![record(1, dec!(100)), record(2, dec!(50)), feb];
        let monthly = MetricsCalculator::monthly_pnl(&trades);
        assert_eq!(monthly.len(), 2);
        assert_eq!((monthly[0].year, monthly[0].month), (2024, 1));
        assert_eq!(monthly[0].pnl, dec!(150));
        assert_eq!(monthly[0].winning_days, 2);
        assert_eq!(monthly[1].pnl, dec!(-20));
    }

    #[test]
    fn test_annualized_and_calmar() {
        let trades = vec![record(1, dec!(100)), record(2, dec!(-50)), record(3, dec!(100))];
        let report = calculate(&trades);
        assert_relative_eq!(report.annualized_return, 50.0 * 252.0, epsilon = 1e-9);
        assert_relative_eq!(report.calmar_ratio, 50.0 * 252.0 / 50.0, epsilon = 1e-9);
    }
}
