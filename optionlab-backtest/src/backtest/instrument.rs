//! Per-instrument trading constants.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::ConfigError;

/// Lot size and strike step of an underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub lot_size: u32,
    pub strike_step: Decimal,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self::nifty()
    }
}

impl InstrumentSpec {
    pub fn new(symbol: impl Into<String>, lot_size: u32, strike_step: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            lot_size,
            strike_step,
        }
    }

    pub fn nifty() -> Self {
        Self::new("NIFTY", 25, Decimal::from(50))
    }

    pub fn banknifty() -> Self {
        Self::new("BANKNIFTY", 15, Decimal::from(100))
    }

    /// Known instrument by symbol, case-insensitive.
    pub fn preset(symbol: &str) -> Option<Self> {
        match symbol.trim().to_ascii_uppercase().as_str() {
            "NIFTY" => Some(Self::nifty()),
            "BANKNIFTY" => Some(Self::banknifty()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lot_size == 0 {
            return Err(ConfigError::invalid(format!(
                "{}: lot size must be > 0",
                self.symbol
            )));
        }
        if self.strike_step <= Decimal::ZERO {
            return Err(ConfigError::invalid(format!(
                "{}: strike step must be > 0",
                self.symbol
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_presets() {
        let nifty = InstrumentSpec::preset("nifty").unwrap();
        assert_eq!(nifty.lot_size, 25);
        assert_eq!(nifty.strike_step, dec!(50));

        let banknifty = InstrumentSpec::preset("BANKNIFTY").unwrap();
        assert_eq!(banknifty.lot_size, 15);
        assert_eq!(banknifty.strike_step, dec!(100));

        assert!(InstrumentSpec::preset("SENSEX").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(InstrumentSpec::default().validate().is_ok());
        assert!(InstrumentSpec::new("X", 0, dec!(50)).validate().is_err());
        assert!(InstrumentSpec::new("X", 25, dec!(0)).validate().is_err());
    }
}
