//! Brokerage model.
//!
//! Default: flat 20 per order. Every leg entry and every leg exit is one
//! order; a basket combined exit is a single order for all forced legs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a combined forced close is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedExitBrokerage {
    /// One order per forced leg.
    #[default]
    PerLeg,
    /// One order for the whole forced close.
    Basket,
}

/// Flat per-order brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerageModel {
    #[serde(default = "default_per_order")]
    pub per_order: Decimal,
}

fn default_per_order() -> Decimal {
    Decimal::from(20)
}

impl Default for BrokerageModel {
    fn default() -> Self {
        Self {
            per_order: default_per_order(),
        }
    }
}

impl BrokerageModel {
    pub fn new(per_order: Decimal) -> Self {
        Self { per_order }
    }

    /// Create a zero-brokerage model.
    pub fn zero() -> Self {
        Self {
            per_order: Decimal::ZERO,
        }
    }

    /// Brokerage for `orders` orders.
    pub fn for_orders(&self, orders: usize) -> Decimal {
        self.per_order * Decimal::from(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_brokerage() {
        let model = BrokerageModel::default();
        assert_eq!(model.per_order, dec!(20));
        assert_eq!(model.for_orders(2), dec!(40));
    }

    #[test]
    fn test_for_orders() {
        let model = BrokerageModel::new(dec!(15.5));
        assert_eq!(model.for_orders(4), dec!(62));
        assert_eq!(model.for_orders(0), dec!(0));
    }

    #[test]
    fn test_zero_brokerage() {
        assert_eq!(BrokerageModel::zero().for_orders(2), dec!(0));
    }

    #[test]
    fn test_combined_exit_policy_names() {
        let policy: CombinedExitBrokerage = serde_json::from_str("\"basket\"").unwrap();
        assert_eq!(policy, CombinedExitBrokerage::Basket);
        assert_eq!(CombinedExitBrokerage::default(), CombinedExitBrokerage::PerLeg);
    }
}
