//! Option symbol parsing for combined option files.
//!
//! Two exchange-style encodings are recognised:
//! - weekly: `NIFTY24012521500CE` = underlying, YYMMDD expiry, strike, type
//! - monthly: `NIFTY24JAN21500CE` = underlying, YY, month, strike, type.
//!   The expiry is the last Thursday of that month.

use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;

use super::types::{ContractKey, OptionType};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// A decoded option symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub underlying: String,
    pub contract: ContractKey,
}

/// Decode an option symbol, returning `None` for anything unrecognised.
pub fn parse_symbol(symbol: &str) -> Option<ParsedSymbol> {
    let s = symbol.trim().to_ascii_uppercase();
    if !s.is_ascii() {
        return None;
    }

    let (body, option_type) = if let Some(body) = s.strip_suffix("CE") {
        (body, OptionType::Call)
    } else if let Some(body) = s.strip_suffix("PE") {
        (body, OptionType::Put)
    } else {
        return None;
    };

    let split = body.find(|c: char| c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let underlying = &body[..split];
    let rest = &body[split..];

    let (expiry, strike) = if rest.len() > 5 && rest[2..5].bytes().all(|b| b.is_ascii_alphabetic()) {
        let year = 2000 + rest[..2].parse::<i32>().ok()?;
        let month = MONTHS.iter().position(|m| *m == &rest[2..5])? as u32 + 1;
        (last_weekday_of_month(year, month, Weekday::Thu)?, &rest[5..])
    } else if rest.len() > 6 {
        let expiry = NaiveDate::parse_from_str(&rest[..6], "%y%m%d").ok()?;
        (expiry, &rest[6..])
    } else {
        return None;
    };

    let strike = Decimal::from_str(strike).ok()?;
    if strike <= Decimal::ZERO {
        return None;
    }

    Some(ParsedSymbol {
        underlying: underlying.to_string(),
        contract: ContractKey::new(expiry, strike, option_type),
    })
}

/// Last occurrence of `weekday` in the given month.
pub fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Some(day)
}
