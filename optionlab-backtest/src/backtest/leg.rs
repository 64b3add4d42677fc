//! Leg simulator.
//!
//! Each leg moves `Pending -> Open -> Closed` once per day. A pending leg
//! that cannot be entered closes immediately with `DATA_MISSING` and
//! contributes nothing. An open leg closes at the first of its exit time,
//! its stoploss, its target, or a combined exit forced by the day
//! simulator. When stoploss and target trigger on the same bar the
//! stoploss wins.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Bar, ContractKey, Session};
use crate::strategy::config::enabled_fraction;
use crate::strategy::{Action, StrategyLeg};

use super::slippage::{Fill, SlippageModel};
use super::trade::{ExitReason, LegFailure, LegPosition};

/// Which bar prices are compared against stoploss/target levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPrice {
    /// Bar close; exits fill at the close.
    #[default]
    Close,
    /// Bar high/low on the adverse/favourable side; exits fill at the
    /// extreme that triggered.
    Extremes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    Pending,
    Open,
    Closed,
}

/// Runtime state of one leg for one day.
#[derive(Debug, Clone)]
pub struct LegSimulator<'a> {
    index: usize,
    leg: &'a StrategyLeg,
    quantity: u32,
    state: LegState,
    stoploss: Option<Decimal>,
    target: Option<Decimal>,
    contract: Option<ContractKey>,
    session: Option<Session>,
    entry: Option<Fill>,
    entry_time: Option<NaiveDateTime>,
    exit: Option<Fill>,
    exit_time: Option<NaiveDateTime>,
    mark: Decimal,
    reason: Option<ExitReason>,
    failure: Option<LegFailure>,
    slippage: Decimal,
    brokerage: Decimal,
    stale_exit: bool,
}

impl<'a> LegSimulator<'a> {
    pub fn new(index: usize, leg: &'a StrategyLeg, lot_size: u32) -> Self {
        Self {
            index,
            leg,
            quantity: leg.lots * lot_size,
            state: LegState::Pending,
            stoploss: enabled_fraction(leg.stoploss_percent),
            target: enabled_fraction(leg.target_percent),
            contract: None,
            session: None,
            entry: None,
            entry_time: None,
            exit: None,
            exit_time: None,
            mark: Decimal::ZERO,
            reason: None,
            failure: None,
            slippage: Decimal::ZERO,
            brokerage: Decimal::ZERO,
            stale_exit: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn leg(&self) -> &'a StrategyLeg {
        self.leg
    }

    pub fn state(&self) -> LegState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LegState::Open
    }

    pub fn is_pending(&self) -> bool {
        self.state == LegState::Pending
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn exit_time(&self) -> Option<NaiveDateTime> {
        self.exit_time
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.reason
    }

    /// Closed at a stale mark because no exit price was available.
    pub fn is_stale(&self) -> bool {
        self.stale_exit
    }

    pub fn failure(&self) -> Option<LegFailure> {
        self.failure
    }

    fn qty(&self) -> Decimal {
        Decimal::from(self.quantity)
    }

    /// Pending leg cannot be entered today.
    pub fn fail(&mut self, failure: LegFailure) {
        if self.state != LegState::Pending {
            return;
        }
        debug!(leg = self.index, ?failure, "Leg failed to enter");
        self.state = LegState::Closed;
        self.reason = Some(ExitReason::DataMissing);
        self.failure = Some(failure);
    }

    /// Pending leg will not be entered (the day already closed out).
    pub fn cancel(&mut self) {
        if self.state == LegState::Pending {
            self.state = LegState::Closed;
        }
    }

    /// Open the leg at `price`.
    pub fn enter(
        &mut self,
        contract: ContractKey,
        session: Session,
        time: NaiveDateTime,
        price: Decimal,
        slippage: &SlippageModel,
        brokerage: Decimal,
    ) {
        if self.state != LegState::Pending {
            return;
        }

        let fill = slippage.fill(self.leg.action, price);
        debug!(
            leg = self.index,
            contract = %contract,
            action = self.leg.action.as_str(),
            %price,
            fill = %fill.fill_price,
            %time,
            "Leg entered"
        );

        self.slippage += fill.cost(self.qty());
        self.brokerage += brokerage;
        self.contract = Some(contract);
        self.session = Some(session);
        self.entry = Some(fill);
        self.entry_time = Some(time);
        self.mark = price;
        self.state = LegState::Open;
    }

    /// Update the mark-to-market price.
    pub fn mark(&mut self, price: Decimal) {
        if self.state == LegState::Open {
            self.mark = price;
        }
    }

    pub fn current_mark(&self) -> Decimal {
        self.mark
    }

    fn stoploss_level(&self) -> Option<Decimal> {
        let entry = self.entry?.price;
        let sl = self.stoploss?;
        Some(match self.leg.action {
            Action::Sell => entry * (Decimal::ONE + sl),
            Action::Buy => entry * (Decimal::ONE - sl),
        })
    }

    fn target_level(&self) -> Option<Decimal> {
        let entry = self.entry?.price;
        let target = self.target?;
        Some(match self.leg.action {
            Action::Sell => entry * (Decimal::ONE - target),
            Action::Buy => entry * (Decimal::ONE + target),
        })
    }

    /// Stoploss/target check against one bar. Returns the reason and the
    /// exit price. Stoploss is checked first.
    pub fn check_thresholds(&self, bar: &Bar, trigger: TriggerPrice) -> Option<(ExitReason, Decimal)> {
        if self.state != LegState::Open {
            return None;
        }
        if self.entry.map_or(true, |e| e.price <= Decimal::ZERO) {
            return None;
        }

        let action = self.leg.action;
        let (adverse, favourable) = match (trigger, action) {
            (TriggerPrice::Close, _) => (bar.close, bar.close),
            (TriggerPrice::Extremes, Action::Sell) => (bar.high, bar.low),
            (TriggerPrice::Extremes, Action::Buy) => (bar.low, bar.high),
        };

        if let Some(level) = self.stoploss_level() {
            let hit = match action {
                Action::Sell => adverse >= level,
                Action::Buy => adverse <= level,
            };
            if hit {
                return Some((ExitReason::Stoploss, adverse));
            }
        }

        if let Some(level) = self.target_level() {
            let hit = match action {
                Action::Sell => favourable <= level,
                Action::Buy => favourable >= level,
            };
            if hit {
                return Some((ExitReason::Target, favourable));
            }
        }

        None
    }

    /// Close the leg at `price`.
    pub fn close(
        &mut self,
        time: NaiveDateTime,
        price: Decimal,
        reason: ExitReason,
        slippage: &SlippageModel,
        brokerage: Decimal,
    ) {
        if self.state != LegState::Open {
            return;
        }

        let fill = slippage.fill(self.leg.action.opposite(), price);
        debug!(
            leg = self.index,
            %reason,
            %price,
            fill = %fill.fill_price,
            %time,
            "Leg closed"
        );

        self.slippage += fill.cost(self.qty());
        self.brokerage += brokerage;
        self.mark = price;
        self.exit = Some(fill);
        self.exit_time = Some(time);
        self.reason = Some(reason);
        self.state = LegState::Closed;
    }

    /// Close at the last known mark because no exit price was available.
    pub fn close_at_mark(
        &mut self,
        time: NaiveDateTime,
        reason: ExitReason,
        slippage: &SlippageModel,
        brokerage: Decimal,
    ) {
        if self.state == LegState::Open {
            self.stale_exit = true;
            self.close(time, self.mark, reason, slippage, brokerage);
        }
    }

    /// Entry premium (entry price times quantity), once opened.
    pub fn premium(&self) -> Option<Decimal> {
        self.entry.map(|e| e.price * self.qty())
    }

    /// Gross P&L at market prices: realized once closed, mark-to-market
    /// while open, zero if never entered.
    pub fn gross_pnl(&self) -> Decimal {
        match self.entry {
            Some(entry) => self.leg.action.sign() * (self.mark - entry.price) * self.qty(),
            None => Decimal::ZERO,
        }
    }

    pub fn into_position(self) -> LegPosition {
        let gross_pnl = self.gross_pnl();
        LegPosition {
            leg_index: self.index,
            option_type: self.leg.option_type,
            action: self.leg.action,
            quantity: self.quantity,
            strike: self.contract.map(|c| c.strike),
            entry_time: self.entry_time,
            entry_price: self.entry.map(|f| f.price),
            entry_fill: self.entry.map(|f| f.fill_price),
            exit_time: self.exit_time,
            exit_price: self.exit.map(|f| f.price),
            exit_fill: self.exit.map(|f| f.fill_price),
            exit_reason: self.reason,
            failure: self.failure,
            gross_pnl,
            slippage: self.slippage,
            brokerage: self.brokerage,
            net_pnl: gross_pnl - self.slippage - self.brokerage,
        }
    }
}
