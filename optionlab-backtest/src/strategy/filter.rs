//! Indicator-based entry filters evaluated on the spot series.

use serde::{Deserialize, Serialize};

use crate::data::Bar;
use crate::indicators::{IndicatorError, IndicatorSpec, Ohlcv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Above,
    Below,
}

/// `indicator[line] <comparison> value`, where a missing value means the
/// spot close of the decision bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub indicator: IndicatorSpec,

    #[serde(default)]
    pub line: Option<String>,

    pub comparison: Comparison,

    #[serde(default)]
    pub value: Option<f64>,
}

impl EntryFilter {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        self.indicator.validate_line(self.line.as_deref())
    }

    /// Evaluate on spot bars; the last bar is the decision bar.
    ///
    /// An indicator still in its warm-up period fails the filter.
    pub fn passes(&self, bars: &[Bar]) -> Result<bool, IndicatorError> {
        let ohlcv = Ohlcv::from_bars(bars);
        let Some(&close) = ohlcv.close.last() else {
            return Ok(false);
        };

        let output = self.indicator.compute(&ohlcv)?;
        let line = output.line(self.line.as_deref()).ok_or_else(|| {
            IndicatorError::invalid_parameter(format!("{} has no such output line", self.indicator))
        })?;

        let Some(current) = line.last().copied().flatten() else {
            return Ok(false);
        };
        let threshold = self.value.unwrap_or(close);

        Ok(match self.comparison {
            Comparison::Above => current > threshold,
            Comparison::Below => current < threshold,
        })
    }
}

/// Whether every filter passes. No filters always passes.
pub fn filters_pass(filters: &[EntryFilter], bars: &[Bar]) -> Result<bool, IndicatorError> {
    for filter in filters {
        if !filter.passes(bars)? {
            return Ok(false);
        }
    }
    Ok(true)
}
