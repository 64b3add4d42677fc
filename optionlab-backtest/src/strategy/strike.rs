//! Strike resolution.
//!
//! ATM is the spot price rounded to the nearest strike step (halves round
//! away from zero). The offset counts steps out of the money: for a CALL
//! that is a higher strike, for a PUT a lower one. ITM negates the offset.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::data::{ContractKey, DataError, MarketData, OptionType, Session};

use super::config::{StrategyLeg, StrikeSelection};

#[derive(Error, Debug)]
pub enum StrikeError {
    #[error("Strike unavailable: {0}")]
    StrikeUnavailable(ContractKey),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

/// ATM strike for a spot price.
pub fn atm_strike(spot: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return spot;
    }
    (spot / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Resolve a selection rule to a strike. Pure: same inputs, same strike.
pub fn resolve_strike(
    selection: StrikeSelection,
    offset: i32,
    option_type: OptionType,
    spot: Decimal,
    step: Decimal,
) -> Decimal {
    let atm = atm_strike(spot, step);
    let otm_steps = match selection {
        StrikeSelection::Atm | StrikeSelection::Otm => offset,
        StrikeSelection::Itm => -offset,
    };
    let shift = Decimal::from(otm_steps) * step;

    let strike = match option_type {
        OptionType::Call => atm + shift,
        OptionType::Put => atm - shift,
    };
    strike.normalize()
}

/// A leg's contract together with its session for the day.
#[derive(Debug, Clone)]
pub struct ResolvedContract {
    pub contract: ContractKey,
    pub session: Session,
}

/// Resolve a leg against the store. The strike must be listed for the
/// expiry and have bars on `date`.
pub fn resolve_contract(
    data: &MarketData,
    leg: &StrategyLeg,
    date: NaiveDate,
    expiry: NaiveDate,
    spot: Decimal,
    step: Decimal,
) -> Result<ResolvedContract, StrikeError> {
    let strike = resolve_strike(
        leg.strike_selection,
        leg.strike_offset,
        leg.option_type,
        spot,
        step,
    );
    let contract = ContractKey::new(expiry, strike, leg.option_type);

    if !data.has_strike(&contract)? {
        return Err(StrikeError::StrikeUnavailable(contract));
    }

    match data.option_session(&contract, date) {
        Ok(session) => Ok(ResolvedContract { contract, session }),
        Err(DataError::DataNotFound(_)) => Err(StrikeError::StrikeUnavailable(contract)),
        Err(e) => Err(e.into()),
    }
}
