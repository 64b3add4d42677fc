//! Bounded oscillators: RSI, Stochastic, CCI, Williams %R.

use super::moving_average::sma_line;
use super::{check_lengths, check_period, window_range, Line, Result};

/// Stochastic oscillator output.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticResult {
    pub k: Line,
    pub d: Line,
}

/// Relative Strength Index with Wilder's smoothing.
///
/// The first value appears at index `period` (one change per bar after the
/// first). A window with no losses reads 100, one with no movement reads 50.
pub fn rsi(close: &[f64], period: usize) -> Result<Line> {
    check_period("RSI", period)?;

    let n = close.len();
    let mut result = vec![None; n];
    if n <= period {
        return Ok(result);
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_value(avg_gain, avg_loss));

    let p = period as f64;
    for i in (period + 1)..n {
        let change = close[i] - close[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    Ok(result)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Stochastic oscillator.
///
/// %K is the close's position within the `k_period` high/low range (50 when
/// the range is flat); %D is the SMA of %K over `d_period`.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> Result<StochasticResult> {
    check_period("Stochastic %K", k_period)?;
    check_period("Stochastic %D", d_period)?;
    check_lengths(close.len(), &[high.len(), low.len()])?;

    let n = close.len();
    let mut k = vec![None; n];
    for i in (k_period.saturating_sub(1))..n {
        let (highest, lowest) = window_range(high, low, i, k_period);
        let range = highest - lowest;
        k[i] = Some(if range == 0.0 {
            50.0
        } else {
            100.0 * (close[i] - lowest) / range
        });
    }

    let d = sma_line(&k, d_period);
    Ok(StochasticResult { k, d })
}

/// Commodity Channel Index with the 0.015 constant.
///
/// Zero mean deviation reads 0.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Result<Line> {
    check_period("CCI", period)?;
    check_lengths(close.len(), &[high.len(), low.len()])?;

    let typical: Vec<f64> = (0..close.len())
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect();

    let n = typical.len();
    let mut result = vec![None; n];
    for i in (period.saturating_sub(1))..n {
        let window = &typical[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let mean_dev = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        result[i] = Some(if mean_dev == 0.0 {
            0.0
        } else {
            (typical[i] - mean) / (0.015 * mean_dev)
        });
    }

    Ok(result)
}

/// Williams %R in [-100, 0]; a flat range reads -50.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Result<Line> {
    check_period("Williams %R", period)?;
    check_lengths(close.len(), &[high.len(), low.len()])?;

    let n = close.len();
    let mut result = vec![None; n];
    for i in (period.saturating_sub(1))..n {
        let (highest, lowest) = window_range(high, low, i, period);
        let range = highest - lowest;
        result[i] = Some(if range == 0.0 {
            -50.0
        } else {
            -100.0 * (highest - close[i]) / range
        });
    }

    Ok(result)
}
