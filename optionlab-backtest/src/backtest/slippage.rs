//! Percentage slippage model.
//!
//! Every fill moves against the order by a fixed percentage of the traded
//! price: buy orders fill higher, sell orders fill lower.
//!
//! | Order | Fill                        |
//! |-------|-----------------------------|
//! | Buy   | price * (1 + pct / 100)     |
//! | Sell  | price * (1 - pct / 100)     |

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::strategy::Action;

/// A single fill after slippage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Market price before slippage.
    pub price: Decimal,
    /// Price actually paid or received.
    pub fill_price: Decimal,
    /// Slippage cost per unit (always >= 0).
    pub cost_per_unit: Decimal,
}

impl Fill {
    /// Slippage cost of the whole order.
    pub fn cost(&self, quantity: Decimal) -> Decimal {
        self.cost_per_unit * quantity
    }
}

/// Configurable slippage model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageModel {
    /// Slippage in percent of the fill price (0.05 = 0.05%).
    #[serde(default = "default_pct")]
    pub pct: Decimal,
}

fn default_pct() -> Decimal {
    dec!(0.05)
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self { pct: default_pct() }
    }
}

impl SlippageModel {
    pub fn new(pct: Decimal) -> Self {
        Self { pct }
    }

    /// Create a zero-slippage model (fills at the market price).
    pub fn zero() -> Self {
        Self { pct: Decimal::ZERO }
    }

    fn fraction(&self) -> Decimal {
        self.pct / Decimal::ONE_HUNDRED
    }

    /// Fill price for a buy order.
    pub fn buy_fill(&self, price: Decimal) -> Decimal {
        price * (Decimal::ONE + self.fraction())
    }

    /// Fill price for a sell order.
    pub fn sell_fill(&self, price: Decimal) -> Decimal {
        price * (Decimal::ONE - self.fraction())
    }

    /// Fill an order in the given direction.
    pub fn fill(&self, side: Action, price: Decimal) -> Fill {
        let fill_price = match side {
            Action::Buy => self.buy_fill(price),
            Action::Sell => self.sell_fill(price),
        };
        Fill {
            price,
            fill_price,
            cost_per_unit: (fill_price - price).abs(),
        }
    }
}
