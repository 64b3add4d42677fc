//! Moving averages: SMA, EMA, WMA, DEMA, TEMA.

use super::{check_period, defined, Line, Result};

/// Simple Moving Average.
///
/// # Arguments
/// * `data` - Price data
/// * `period` - Lookback period
///
/// # Returns
/// SMA values, `None` for the first `period - 1` bars
pub fn sma(data: &[f64], period: usize) -> Result<Line> {
    check_period("SMA", period)?;
    Ok(sma_line(&defined(data), period))
}

/// Exponential Moving Average seeded with the SMA of the first window.
///
/// # Arguments
/// * `data` - Price data
/// * `period` - Lookback period, smoothing factor 2 / (period + 1)
///
/// # Returns
/// EMA values, `None` for the first `period - 1` bars
pub fn ema(data: &[f64], period: usize) -> Result<Line> {
    check_period("EMA", period)?;
    Ok(ema_line(&defined(data), period))
}

/// Linearly Weighted Moving Average (most recent bar weighted `period`).
pub fn wma(data: &[f64], period: usize) -> Result<Line> {
    check_period("WMA", period)?;

    let n = data.len();
    let mut result = vec![None; n];
    if period > n {
        return Ok(result);
    }

    let denominator = (period * (period + 1)) as f64 / 2.0;
    for i in (period - 1)..n {
        let window = &data[i + 1 - period..=i];
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(w, v)| (w + 1) as f64 * v)
            .sum();
        result[i] = Some(weighted / denominator);
    }

    Ok(result)
}

/// Double EMA: 2 * EMA - EMA(EMA).
pub fn dema(data: &[f64], period: usize) -> Result<Line> {
    check_period("DEMA", period)?;

    let e1 = ema_line(&defined(data), period);
    let e2 = ema_line(&e1, period);

    Ok(e1
        .iter()
        .zip(&e2)
        .map(|(a, b)| Some(2.0 * (*a)? - (*b)?))
        .collect())
}

/// Triple EMA: 3 * EMA - 3 * EMA(EMA) + EMA(EMA(EMA)).
pub fn tema(data: &[f64], period: usize) -> Result<Line> {
    check_period("TEMA", period)?;

    let e1 = ema_line(&defined(data), period);
    let e2 = ema_line(&e1, period);
    let e3 = ema_line(&e2, period);

    Ok((0..e1.len())
        .map(|i| Some(3.0 * e1[i]? - 3.0 * e2[i]? + e3[i]?))
        .collect())
}

/// SMA over a line whose leading values may be undefined.
pub(crate) fn sma_line(line: &[Option<f64>], period: usize) -> Line {
    let n = line.len();
    let mut result = vec![None; n];
    if period == 0 {
        return result;
    }

    for i in (period.saturating_sub(1))..n {
        let window: Option<Vec<f64>> = line[i + 1 - period..=i].iter().copied().collect();
        if let Some(window) = window {
            result[i] = Some(window.iter().sum::<f64>() / period as f64);
        }
    }

    result
}

/// EMA over a line whose leading values may be undefined.
///
/// The first output is the SMA of the first `period` defined values; a gap
/// after the seed carries the previous value without emitting output.
pub(crate) fn ema_line(line: &[Option<f64>], period: usize) -> Line {
    ema_line_with_alpha(line, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder's smoothing (alpha = 1 / period) with an SMA seed.
pub(crate) fn wilder_line(line: &[Option<f64>], period: usize) -> Line {
    ema_line_with_alpha(line, period, 1.0 / period as f64)
}

fn ema_line_with_alpha(line: &[Option<f64>], period: usize, alpha: f64) -> Line {
    let n = line.len();
    let mut result = vec![None; n];
    if period == 0 {
        return result;
    }

    let Some(start) = line.iter().position(Option::is_some) else {
        return result;
    };
    if start + period > n {
        return result;
    }

    let seed: Option<Vec<f64>> = line[start..start + period].iter().copied().collect();
    let Some(seed) = seed else {
        return result;
    };

    let mut prev = seed.iter().sum::<f64>() / period as f64;
    result[start + period - 1] = Some(prev);

    for i in (start + period)..n {
        if let Some(value) = line[i] {
            prev = alpha * value + (1.0 - alpha) * prev;
            result[i] = Some(prev);
        }
    }

    result
}
