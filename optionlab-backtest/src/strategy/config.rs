//! Strategy definitions.
//!
//! A strategy is an ordered list of uniform legs plus portfolio-level
//! combined thresholds. It is supplied once per run and never mutated.

use std::path::Path;

use chrono::NaiveTime;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::OptionType;
use crate::indicators::IndicatorError;

use super::filter::EntryFilter;

/// Errors raised while loading or validating configuration.
///
/// Any of these fails the run before a single day is simulated.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid indicator: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Trade direction of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl Action {
    /// +1 for BUY, -1 for SELL. P&L = sign * (exit - entry) * quantity.
    pub fn sign(&self) -> Decimal {
        match self {
            Action::Buy => Decimal::ONE,
            Action::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// Direction of the order that closes a position opened with `self`.
    pub fn opposite(&self) -> Action {
        match self {
            Action::Buy => Action::Sell,
            Action::Sell => Action::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }
}

/// Strike selection rule relative to the at-the-money strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrikeSelection {
    #[default]
    #[serde(alias = "atm")]
    Atm,
    #[serde(alias = "itm")]
    Itm,
    #[serde(alias = "otm")]
    Otm,
}

/// One option leg of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyLeg {
    pub option_type: OptionType,

    #[serde(default)]
    pub strike_selection: StrikeSelection,

    /// Signed offset in strike steps.
    #[serde(default)]
    pub strike_offset: i32,

    pub action: Action,

    #[serde(default = "default_lots")]
    pub lots: u32,

    #[serde(with = "time_format")]
    pub entry_time: NaiveTime,

    #[serde(with = "time_format")]
    pub exit_time: NaiveTime,

    /// Per-leg stoploss as a percentage of the entry price. `None` or 0 disables.
    #[serde(default)]
    pub stoploss_percent: Option<f64>,

    /// Per-leg target as a percentage of the entry price. `None` or 0 disables.
    #[serde(default)]
    pub target_percent: Option<f64>,
}

fn default_lots() -> u32 {
    1
}

/// What combined percentages are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombinedBasis {
    /// Sum of entry price * quantity over the legs that opened.
    #[default]
    TotalPremium,
    /// A fixed capital amount.
    Notional { amount: Decimal },
}

/// A complete multi-leg strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub legs: Vec<StrategyLeg>,

    /// Combined stoploss, percent of the combined basis. `None` or 0 disables.
    #[serde(default)]
    pub combined_sl_percent: Option<f64>,

    /// Combined target, percent of the combined basis. `None` or 0 disables.
    #[serde(default)]
    pub combined_target_percent: Option<f64>,

    #[serde(default)]
    pub combined_basis: CombinedBasis,

    /// Indicator conditions on the spot series that must all hold at entry.
    #[serde(default)]
    pub entry_filters: Vec<EntryFilter>,
}

fn default_name() -> String {
    "strategy".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            legs: Vec::new(),
            combined_sl_percent: None,
            combined_target_percent: None,
            combined_basis: CombinedBasis::default(),
            entry_filters: Vec::new(),
        }
    }
}

impl StrategyConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_config(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject malformed definitions. A strategy with zero legs is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, leg) in self.legs.iter().enumerate() {
            if leg.lots == 0 {
                return Err(ConfigError::invalid(format!("leg {}: lots must be > 0", i)));
            }
            if leg.exit_time <= leg.entry_time {
                return Err(ConfigError::invalid(format!(
                    "leg {}: exit time {} is not after entry time {}",
                    i, leg.exit_time, leg.entry_time
                )));
            }
            check_percent(&format!("leg {} stoploss_percent", i), leg.stoploss_percent)?;
            check_percent(&format!("leg {} target_percent", i), leg.target_percent)?;
        }

        check_percent("combined_sl_percent", self.combined_sl_percent)?;
        check_percent("combined_target_percent", self.combined_target_percent)?;

        if let CombinedBasis::Notional { amount } = self.combined_basis {
            if amount <= Decimal::ZERO {
                return Err(ConfigError::invalid("notional amount must be > 0"));
            }
        }

        for filter in &self.entry_filters {
            filter.validate()?;
        }

        Ok(())
    }

    /// Earliest configured entry time across legs.
    pub fn first_entry_time(&self) -> Option<NaiveTime> {
        self.legs.iter().map(|l| l.entry_time).min()
    }
}

fn check_percent(field: &str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ConfigError::invalid(format!(
            "{} must be a non-negative number, got {}",
            field, v
        ))),
        _ => Ok(()),
    }
}

/// Threshold as an enabled fraction: `None` when unset or zero.
///
/// The percent is taken at its shortest decimal form, so `12.3` becomes
/// exactly `0.123`.
pub(crate) fn enabled_fraction(percent: Option<f64>) -> Option<Decimal> {
    let percent = percent.filter(|p| *p > 0.0)?;
    Decimal::from_f64(percent).map(|p| p / Decimal::ONE_HUNDRED)
}

/// Deserialize a config file, choosing the format from the extension.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).map_err(|e| parse_error(e.to_string())),
        Some("json") => serde_json::from_str(&text).map_err(|e| parse_error(e.to_string())),
        _ => Err(ConfigError::invalid(format!(
            "unsupported config format: {}",
            path.display()
        ))),
    }
}

/// `HH:MM` or `HH:MM:SS` wall-clock times.
pub(crate) mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}'", s)))
    }

    pub fn parse(s: &str) -> Option<NaiveTime> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
    }
}
