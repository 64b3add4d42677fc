//! Volatility indicators: ATR, Bollinger Bands, Keltner Channels.

use statrs::statistics::Statistics;

use super::moving_average::{ema_line, wilder_line};
use super::{check_lengths, check_period, IndicatorError, Line, Result};

/// Upper/middle/lower band output shared by Bollinger and Keltner.
#[derive(Debug, Clone, PartialEq)]
pub struct BandsResult {
    pub upper: Line,
    pub middle: Line,
    pub lower: Line,
}

/// True range per bar. The first bar has no previous close, so its true
/// range is simply high - low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>> {
    check_lengths(close.len(), &[high.len(), low.len()])?;

    Ok((0..close.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect())
}

/// Average True Range with Wilder's smoothing.
///
/// # Arguments
/// * `high`, `low`, `close` - Price data
/// * `period` - Lookback period
///
/// # Returns
/// ATR values, first defined at index `period - 1`
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Result<Line> {
    check_period("ATR", period)?;
    let tr = true_range(high, low, close)?;
    let line: Line = tr.into_iter().map(Some).collect();
    Ok(wilder_line(&line, period))
}

/// Bollinger Bands: SMA middle band, sample standard deviation width.
///
/// # Arguments
/// * `close` - Price data
/// * `period` - Lookback period (at least 2)
/// * `std_dev` - Band width in standard deviations
pub fn bollinger_bands(close: &[f64], period: usize, std_dev: f64) -> Result<BandsResult> {
    if period < 2 {
        return Err(IndicatorError::invalid_parameter(
            "Bollinger period must be >= 2",
        ));
    }

    let n = close.len();
    let mut upper = vec![None; n];
    let mut middle = vec![None; n];
    let mut lower = vec![None; n];

    for i in (period - 1)..n {
        let window = &close[i + 1 - period..=i];
        let mean = window.mean();
        let width = window.std_dev() * std_dev;
        upper[i] = Some(mean + width);
        middle[i] = Some(mean);
        lower[i] = Some(mean - width);
    }

    Ok(BandsResult {
        upper,
        middle,
        lower,
    })
}

/// Keltner Channels: EMA of the typical price, offset by a multiple of ATR.
pub fn keltner_channels(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    atr_period: usize,
    multiplier: f64,
) -> Result<BandsResult> {
    check_period("Keltner", period)?;
    let range = atr(high, low, close, atr_period)?;

    let typical: Line = (0..close.len())
        .map(|i| Some((high[i] + low[i] + close[i]) / 3.0))
        .collect();
    let middle = ema_line(&typical, period);

    let upper = middle
        .iter()
        .zip(&range)
        .map(|(m, a)| Some((*m)? + multiplier * (*a)?))
        .collect();
    let lower = middle
        .iter()
        .zip(&range)
        .map(|(m, a)| Some((*m)? - multiplier * (*a)?))
        .collect();

    Ok(BandsResult {
        upper,
        middle,
        lower,
    })
}
