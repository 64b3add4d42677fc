//! Strategy simulator for a single trading day.
//!
//! Builds the day's event timeline (spot bar timestamps between the first
//! entry and the last exit, every leg's entry and exit instant, and the
//! option bars of each contract once it is resolved) and walks it in
//! order. At each instant:
//! 1. pending legs whose entry time has come are resolved and entered,
//! 2. open legs are marked and checked against their stoploss/target,
//! 3. the combined stoploss/target is checked across all legs,
//! 4. open legs whose exit time has come are closed.

use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Unbounded};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::data::{bar_at, latest_bar, Bar, DataError, MarketData, Session};
use crate::strategy::config::enabled_fraction;
use crate::strategy::{filters_pass, resolve_contract, CombinedBasis, StrategyConfig, StrikeError};

use super::brokerage::CombinedExitBrokerage;
use super::engine::BacktestConfig;
use super::leg::{LegSimulator, LegState};
use super::trade::{ExitReason, LegFailure, TradeRecord};

/// Simulates one strategy over one day at a time.
pub struct DaySimulator<'a> {
    data: &'a MarketData,
    strategy: &'a StrategyConfig,
    config: &'a BacktestConfig,
    combined_sl: Option<Decimal>,
    combined_target: Option<Decimal>,
}

impl<'a> DaySimulator<'a> {
    pub fn new(data: &'a MarketData, strategy: &'a StrategyConfig, config: &'a BacktestConfig) -> Self {
        Self {
            data,
            strategy,
            config,
            combined_sl: enabled_fraction(strategy.combined_sl_percent),
            combined_target: enabled_fraction(strategy.combined_target_percent),
        }
    }

    fn tolerance(&self) -> Duration {
        Duration::minutes(i64::from(self.config.price_tolerance_minutes))
    }

    /// Simulate `date`. Errors mean the day could not be simulated at all
    /// (missing spot session or expiry) and should be skipped.
    pub fn simulate(&self, date: NaiveDate) -> Result<TradeRecord, DataError> {
        let expiry = self
            .data
            .expiry_for(date, self.config.expiry_rank)
            .ok_or_else(|| DataError::DataNotFound(format!("no expiry on or after {}", date)))?;
        let spot = self.data.spot_session(date)?;

        if !self.entry_allowed(date, &spot) {
            debug!(%date, "Entry filters rejected the day");
            return Ok(TradeRecord {
                entry_filtered: true,
                ..TradeRecord::empty(date, Some(expiry))
            });
        }

        let lot_size = self.config.instrument.lot_size;
        let mut legs: Vec<LegSimulator<'a>> = self
            .strategy
            .legs
            .iter()
            .enumerate()
            .map(|(i, leg)| LegSimulator::new(i, leg, lot_size))
            .collect();

        let mut timeline: BTreeSet<NaiveDateTime> = BTreeSet::new();
        for leg in &self.strategy.legs {
            timeline.insert(date.and_time(leg.entry_time));
            timeline.insert(date.and_time(leg.exit_time));
        }
        let (Some(&first), Some(&last)) = (timeline.first(), timeline.last()) else {
            return Ok(TradeRecord::empty(date, Some(expiry)));
        };
        timeline.extend(
            spot.iter()
                .map(|b| b.timestamp)
                .filter(|ts| *ts >= first && *ts <= last),
        );

        let slippage = &self.config.slippage;
        let per_order = self.config.brokerage.for_orders(1);
        let trigger = self.config.trigger_price;

        let mut combined_triggered = false;
        let mut basket_orders = 0;
        let mut cursor: Option<NaiveDateTime> = None;

        loop {
            let next = match cursor {
                None => timeline.first().copied(),
                Some(c) => timeline.range((Excluded(c), Unbounded)).next().copied(),
            };
            let Some(now) = next else {
                break;
            };
            cursor = Some(now);

            // Entries
            for sim in legs.iter_mut() {
                if !sim.is_pending() || date.and_time(sim.leg().entry_time) != now {
                    continue;
                }
                if let Some(session) = self.enter_leg(sim, date, expiry, now, &spot)? {
                    let exit = date.and_time(sim.leg().exit_time);
                    timeline.extend(
                        session
                            .iter()
                            .map(|b| b.timestamp)
                            .filter(|ts| *ts > now && *ts <= exit),
                    );
                }
            }

            // Per-leg stoploss / target on bars stamped exactly at `now`
            for sim in legs.iter_mut() {
                if !sim.is_open() || date.and_time(sim.leg().entry_time) == now {
                    continue;
                }
                let Some(bar) = sim.session().and_then(|s| bar_at(s, now)).cloned() else {
                    continue;
                };
                sim.mark(bar.close);
                if let Some((reason, price)) = sim.check_thresholds(&bar, trigger) {
                    sim.close(now, price, reason, slippage, per_order);
                }
            }

            // Combined stoploss / target
            if !combined_triggered {
                if let Some(reason) = self.combined_breach(&legs) {
                    combined_triggered = true;
                    let forced = legs.iter().filter(|s| s.is_open()).count();
                    let leg_brokerage = match self.config.combined_exit_brokerage {
                        CombinedExitBrokerage::PerLeg => per_order,
                        CombinedExitBrokerage::Basket => Decimal::ZERO,
                    };
                    if self.config.combined_exit_brokerage == CombinedExitBrokerage::Basket
                        && forced > 0
                    {
                        basket_orders = 1;
                    }

                    debug!(%now, ?reason, forced, "Combined exit");
                    let combined = ExitReason::CombinedExit;
                    for sim in legs.iter_mut() {
                        if !sim.is_open() {
                            sim.cancel();
                            continue;
                        }
                        // A leg without a bar at `now` can only fill at its last mark.
                        if sim.session().and_then(|s| bar_at(s, now)).is_some() {
                            let price = sim.current_mark();
                            sim.close(now, price, combined, slippage, leg_brokerage);
                        } else {
                            sim.close_at_mark(now, combined, slippage, leg_brokerage);
                        }
                    }
                }
            }

            // Time exits
            for sim in legs.iter_mut() {
                if !sim.is_open() || date.and_time(sim.leg().exit_time) != now {
                    continue;
                }
                let price = sim
                    .session()
                    .and_then(|s| latest_bar(s, now, self.tolerance()))
                    .map(|b| b.close);
                match price {
                    Some(price) => sim.close(now, price, ExitReason::Time, slippage, per_order),
                    None => sim.close_at_mark(now, ExitReason::Time, slippage, per_order),
                }
            }

            if legs.iter().all(|s| s.state() == LegState::Closed) {
                break;
            }
        }

        for sim in legs.iter_mut() {
            sim.close_at_mark(last, ExitReason::Time, slippage, per_order);
            sim.cancel();
        }

        Ok(self.record(date, expiry, legs, combined_triggered, basket_orders))
    }

    /// Entry filters on the spot bars up to the earliest entry.
    fn entry_allowed(&self, date: NaiveDate, spot: &[Bar]) -> bool {
        if self.strategy.entry_filters.is_empty() {
            return true;
        }
        let Some(first) = self.strategy.first_entry_time() else {
            return true;
        };

        let cutoff = date.and_time(first);
        let end = spot.partition_point(|b| b.timestamp <= cutoff);
        match filters_pass(&self.strategy.entry_filters, &spot[..end]) {
            Ok(pass) => pass,
            Err(e) => {
                warn!(%date, error = %e, "Entry filter evaluation failed");
                false
            }
        }
    }

    /// Resolve and open one leg. Returns the contract's session when the
    /// leg opened.
    fn enter_leg(
        &self,
        sim: &mut LegSimulator<'a>,
        date: NaiveDate,
        expiry: NaiveDate,
        now: NaiveDateTime,
        spot: &[Bar],
    ) -> Result<Option<Session>, DataError> {
        let Some(spot_bar) = latest_bar(spot, now, self.tolerance()) else {
            sim.fail(LegFailure::SpotMissing);
            return Ok(None);
        };

        let resolved = match resolve_contract(
            self.data,
            sim.leg(),
            date,
            expiry,
            spot_bar.close,
            self.config.instrument.strike_step,
        ) {
            Ok(resolved) => resolved,
            Err(StrikeError::StrikeUnavailable(contract)) => {
                debug!(%date, %contract, "Strike unavailable");
                sim.fail(LegFailure::StrikeUnavailable);
                return Ok(None);
            }
            Err(StrikeError::Data(e)) => return Err(e),
        };

        let Some(price) = latest_bar(&resolved.session, now, self.tolerance()).map(|b| b.close) else {
            sim.fail(LegFailure::NoEntryPrice);
            return Ok(None);
        };

        sim.enter(
            resolved.contract,
            resolved.session.clone(),
            now,
            price,
            &self.config.slippage,
            self.config.brokerage.for_orders(1),
        );
        Ok(Some(resolved.session))
    }

    /// Combined gross P&L against the configured thresholds.
    fn combined_breach(&self, legs: &[LegSimulator<'a>]) -> Option<ExitReason> {
        if self.combined_sl.is_none() && self.combined_target.is_none() {
            return None;
        }
        if !legs.iter().any(|s| s.is_open()) {
            return None;
        }

        let basis = match self.strategy.combined_basis {
            CombinedBasis::TotalPremium => legs.iter().filter_map(|s| s.premium()).sum(),
            CombinedBasis::Notional { amount } => amount,
        };
        if basis <= Decimal::ZERO {
            return None;
        }

        let pnl: Decimal = legs.iter().map(|s| s.gross_pnl()).sum();

        if let Some(sl) = self.combined_sl {
            if pnl <= -(basis * sl) {
                return Some(ExitReason::Stoploss);
            }
        }
        if let Some(target) = self.combined_target {
            if pnl >= basis * target {
                return Some(ExitReason::Target);
            }
        }
        None
    }

    fn record(
        &self,
        date: NaiveDate,
        expiry: NaiveDate,
        legs: Vec<LegSimulator<'a>>,
        combined_triggered: bool,
        basket_orders: usize,
    ) -> TradeRecord {
        let exit_reason = if combined_triggered {
            Some(ExitReason::CombinedExit)
        } else {
            legs.iter()
                .filter(|s| s.exit_time().is_some())
                .max_by_key(|s| (s.exit_time(), s.index()))
                .and_then(|s| s.exit_reason())
                .or_else(|| legs.iter().find_map(|s| s.exit_reason()))
        };
        let partial_data = legs
            .iter()
            .any(|s| s.failure().is_some() || s.is_stale());

        let positions: Vec<_> = legs.into_iter().map(LegSimulator::into_position).collect();

        let gross_pnl: Decimal = positions.iter().map(|p| p.gross_pnl).sum();
        let slippage: Decimal = positions.iter().map(|p| p.slippage).sum();
        let brokerage: Decimal = positions.iter().map(|p| p.brokerage).sum::<Decimal>()
            + self.config.brokerage.for_orders(basket_orders);

        TradeRecord {
            date,
            expiry: Some(expiry),
            legs: positions,
            gross_pnl,
            brokerage,
            slippage,
            net_pnl: gross_pnl - slippage - brokerage,
            exit_reason,
            partial_data,
            entry_filtered: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{BrokerageModel, CombinedExitBrokerage, InstrumentSpec, SlippageModel};
    use crate::data::{ContractKey, InMemorySource, OptionType};
    use crate::indicators::{IndicatorSpec, PriceSource};
    use crate::strategy::{Action, Comparison, EntryFilter, StrategyLeg, StrikeSelection};
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 18).unwrap()
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            instrument: InstrumentSpec::nifty(),
            slippage: SlippageModel::zero(),
            brokerage: BrokerageModel::zero(),
            ..Default::default()
        }
    }

    fn sell_call(sl: Option<f64>) -> StrategyLeg {
        StrategyLeg {
            option_type: OptionType::Call,
            strike_selection: StrikeSelection::Atm,
            strike_offset: 0,
            action: Action::Sell,
            lots: 1,
            entry_time: NaiveTime::from_hms_opt(9, 20, 0).unwrap(),
            exit_time: NaiveTime::from_hms_opt(15, 15, 0).unwrap(),
            stoploss_percent: sl,
            target_percent: None,
        }
    }

    fn sell_put() -> StrategyLeg {
        StrategyLeg {
            option_type: OptionType::Put,
            ..sell_call(None)
        }
    }

    /// Flat spot at 21500 and the given 21500 strike contracts.
    fn market_with(contracts: Vec<(OptionType, Vec<Bar>)>) -> MarketData {
        let spot = vec![
            Bar::flat(ts(9, 15), dec!(21500)),
            Bar::flat(ts(9, 20), dec!(21500)),
            Bar::flat(ts(15, 15), dec!(21500)),
        ];
        let source = contracts.into_iter().fold(
            InMemorySource::new().with_spot(spot),
            |source, (option_type, bars)| {
                source.with_contract(ContractKey::new(expiry(), dec!(21500), option_type), bars)
            },
        );
        MarketData::new(source.clone(), source).unwrap()
    }

    fn market(option_bars: Vec<Bar>) -> MarketData {
        market_with(vec![(OptionType::Call, option_bars)])
    }

    /// Both legs fall at 10:00 for a combined gain of 875.
    fn falling_straddle() -> MarketData {
        market_with(vec![
            (
                OptionType::Call,
                vec![
                    Bar::flat(ts(9, 20), dec!(100)),
                    Bar::flat(ts(10, 0), dec!(80)),
                    Bar::flat(ts(15, 15), dec!(70)),
                ],
            ),
            (
                OptionType::Put,
                vec![
                    Bar::flat(ts(9, 20), dec!(100)),
                    Bar::flat(ts(10, 0), dec!(85)),
                    Bar::flat(ts(15, 15), dec!(95)),
                ],
            ),
        ])
    }

    fn straddle(target: Option<f64>) -> StrategyConfig {
        StrategyConfig {
            legs: vec![sell_call(None), sell_put()],
            combined_target_percent: target,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_legs_records_empty_day() {
        let data = market(vec![Bar::flat(ts(9, 20), dec!(100))]);
        let strategy = StrategyConfig::default();
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        assert!(record.legs.is_empty());
        assert_eq!(record.net_pnl, dec!(0));
        assert_eq!(record.exit_reason, None);
    }

    #[test]
    fn test_time_exit_within_tolerance() {
        // No bar at 15:15; the 15:12 bar is within the 5 minute tolerance.
        let data = market(vec![
            Bar::flat(ts(9, 20), dec!(100)),
            Bar::flat(ts(15, 12), dec!(80)),
        ]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(None)],
            ..Default::default()
        };
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        assert_eq!(record.net_pnl, dec!(500));
        assert_eq!(record.exit_reason, Some(ExitReason::Time));
        assert!(!record.partial_data);
    }

    #[test]
    fn test_stale_exit_is_partial() {
        let data = market(vec![
            Bar::flat(ts(9, 20), dec!(100)),
            Bar::flat(ts(11, 0), dec!(90)),
        ]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(None)],
            ..Default::default()
        };
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        // Closed at the 11:00 mark.
        assert_eq!(record.net_pnl, dec!(250));
        assert_eq!(record.legs[0].exit_time, Some(ts(15, 15)));
        assert!(record.partial_data);
    }

    #[test]
    fn test_missing_entry_price_is_data_missing() {
        let data = market(vec![Bar::flat(ts(10, 0), dec!(100))]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(None)],
            ..Default::default()
        };
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        assert_eq!(record.legs[0].exit_reason, Some(ExitReason::DataMissing));
        assert_eq!(record.legs[0].failure, Some(LegFailure::NoEntryPrice));
        assert_eq!(record.net_pnl, dec!(0));
        assert!(record.partial_data);
        assert_eq!(record.exit_reason, Some(ExitReason::DataMissing));
    }

    #[test]
    fn test_missing_spot_session_is_an_error() {
        let data = market(vec![Bar::flat(ts(9, 20), dec!(100))]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(None)],
            ..Default::default()
        };
        let config = config();
        let other_day = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        assert!(matches!(
            DaySimulator::new(&data, &strategy, &config).simulate(other_day),
            Err(DataError::DataNotFound(_))
        ));
    }

    #[test]
    fn test_stoploss_not_checked_on_entry_bar() {
        // The entry bar's high already exceeds the stoploss level.
        let mut entry = Bar::flat(ts(9, 20), dec!(100));
        entry.high = dec!(140);
        let data = market(vec![entry, Bar::flat(ts(15, 15), dec!(90))]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(Some(30.0))],
            ..Default::default()
        };
        let config = BacktestConfig {
            trigger_price: crate::backtest::TriggerPrice::Extremes,
            ..config()
        };
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        assert_eq!(record.exit_reason, Some(ExitReason::Time));
        assert_eq!(record.net_pnl, dec!(250));
    }

    #[test]
    fn test_combined_target_closes_all_legs() {
        let data = falling_straddle();
        // 15% of a 5000 premium basis is 750.
        let strategy = straddle(Some(15.0));
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();
        assert_eq!(record.exit_reason, Some(ExitReason::CombinedExit));
        for position in &record.legs {
            assert_eq!(position.exit_reason, Some(ExitReason::CombinedExit));
            assert_eq!(position.exit_time, Some(ts(10, 0)));
        }
        assert_eq!(record.net_pnl, dec!(875));
        assert!(!record.partial_data);
    }

    #[test]
    fn test_combined_exit_brokerage_policies() {
        let data = falling_straddle();
        let strategy = straddle(Some(15.0));
        let per_leg = BacktestConfig {
            brokerage: BrokerageModel::new(dec!(20)),
            ..config()
        };
        let basket = BacktestConfig {
            combined_exit_brokerage: CombinedExitBrokerage::Basket,
            ..per_leg.clone()
        };

        // Two entries plus one exit order per leg.
        let record = DaySimulator::new(&data, &strategy, &per_leg).simulate(day()).unwrap();
        assert_eq!(record.brokerage, dec!(80));
        assert_eq!(record.net_pnl, dec!(795));

        // Two entries plus a single order for the forced close.
        let record = DaySimulator::new(&data, &strategy, &basket).simulate(day()).unwrap();
        assert_eq!(record.brokerage, dec!(60));
        assert_eq!(record.net_pnl, dec!(815));
    }

    #[test]
    fn test_notional_combined_basis() {
        let data = market(vec![
            Bar::flat(ts(9, 20), dec!(100)),
            Bar::flat(ts(10, 0), dec!(130)),
            Bar::flat(ts(11, 0), dec!(145)),
            Bar::flat(ts(15, 15), dec!(90)),
        ]);
        let premium = StrategyConfig {
            legs: vec![sell_call(None)],
            combined_sl_percent: Some(10.0),
            ..Default::default()
        };
        let notional = StrategyConfig {
            combined_basis: CombinedBasis::Notional {
                amount: dec!(10000),
            },
            ..premium.clone()
        };
        let config = config();

        // 10% of the 2500 premium: the -750 at 10:00 already breaches.
        let record = DaySimulator::new(&data, &premium, &config).simulate(day()).unwrap();
        assert_eq!(record.legs[0].exit_time, Some(ts(10, 0)));
        assert_eq!(record.net_pnl, dec!(-750));

        // 10% of 10000 is only breached by the -1125 at 11:00.
        let record = DaySimulator::new(&data, &notional, &config).simulate(day()).unwrap();
        assert_eq!(record.exit_reason, Some(ExitReason::CombinedExit));
        assert_eq!(record.legs[0].exit_time, Some(ts(11, 0)));
        assert_eq!(record.net_pnl, dec!(-1125));
    }

    #[test]
    fn test_entry_filter_rejects_day() {
        let data = market(vec![
            Bar::flat(ts(9, 20), dec!(100)),
            Bar::flat(ts(15, 15), dec!(80)),
        ]);
        let filter = |comparison: Comparison| EntryFilter {
            indicator: IndicatorSpec::Sma {
                period: 2,
                source: PriceSource::Close,
            },
            line: None,
            comparison,
            value: Some(22000.0),
        };
        let rejected = StrategyConfig {
            legs: vec![sell_call(None)],
            entry_filters: vec![filter(Comparison::Above)],
            ..Default::default()
        };
        let accepted = StrategyConfig {
            entry_filters: vec![filter(Comparison::Below)],
            ..rejected.clone()
        };
        let config = config();

        let record = DaySimulator::new(&data, &rejected, &config).simulate(day()).unwrap();
        assert!(record.entry_filtered);
        assert!(record.legs.is_empty());
        assert_eq!(record.net_pnl, dec!(0));
        assert_eq!(record.exit_reason, None);
        assert_eq!(record.expiry, Some(expiry()));

        let record = DaySimulator::new(&data, &accepted, &config).simulate(day()).unwrap();
        assert!(!record.entry_filtered);
        assert_eq!(record.net_pnl, dec!(500));
    }

    #[test]
    fn test_combined_exit_without_bar_fills_at_mark() {
        // The put has no 10:00 bar when the call's move breaches the stop.
        let data = market_with(vec![
            (
                OptionType::Call,
                vec![
                    Bar::flat(ts(9, 20), dec!(100)),
                    Bar::flat(ts(10, 0), dec!(160)),
                    Bar::flat(ts(15, 15), dec!(80)),
                ],
            ),
            (
                OptionType::Put,
                vec![Bar::flat(ts(9, 20), dec!(100)), Bar::flat(ts(15, 15), dec!(90))],
            ),
        ]);
        let strategy = StrategyConfig {
            legs: vec![sell_call(None), sell_put()],
            combined_sl_percent: Some(25.0),
            ..Default::default()
        };
        let config = config();
        let record = DaySimulator::new(&data, &strategy, &config).simulate(day()).unwrap();

        assert_eq!(record.exit_reason, Some(ExitReason::CombinedExit));
        let put = &record.legs[1];
        assert_eq!(put.exit_time, Some(ts(10, 0)));
        assert_eq!(put.exit_price, Some(dec!(100)));
        assert_eq!(record.net_pnl, dec!(-1500));
        assert!(record.partial_data);
    }
}
