//! Momentum and trend-strength indicators: MACD, ADX, MOM, ROC.

use super::moving_average::{ema_line, wilder_line};
use super::volatility::true_range;
use super::{check_lengths, check_period, defined, IndicatorError, Line, Result};

/// MACD output.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdResult {
    pub macd: Line,
    pub signal: Line,
    pub histogram: Line,
}

/// ADX output with its directional indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct AdxResult {
    pub adx: Line,
    pub plus_di: Line,
    pub minus_di: Line,
}

/// Moving Average Convergence Divergence.
///
/// # Arguments
/// * `close` - Price data
/// * `fast_period` - Fast EMA period
/// * `slow_period` - Slow EMA period, must exceed `fast_period`
/// * `signal_period` - EMA period of the MACD line
pub fn macd(
    close: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<MacdResult> {
    check_period("MACD fast", fast_period)?;
    check_period("MACD signal", signal_period)?;
    if fast_period >= slow_period {
        return Err(IndicatorError::invalid_parameter(
            "MACD fast period must be less than slow period",
        ));
    }

    let data = defined(close);
    let fast = ema_line(&data, fast_period);
    let slow = ema_line(&data, slow_period);

    let macd: Line = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_line(&macd, signal_period);
    let histogram = macd
        .iter()
        .zip(&signal)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    Ok(MacdResult {
        macd,
        signal,
        histogram,
    })
}

/// Average Directional Index with Wilder's smoothing.
///
/// Directional movement starts at the second bar, so +DI/-DI are first
/// defined at index `period` and ADX at `2 * period - 1`.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Result<AdxResult> {
    check_period("ADX", period)?;
    check_lengths(close.len(), &[high.len(), low.len()])?;

    let n = close.len();
    let tr = true_range(high, low, close)?;

    let mut plus_dm: Line = vec![None; n];
    let mut minus_dm: Line = vec![None; n];
    let mut tr_line: Line = vec![None; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
        tr_line[i] = Some(tr[i]);
    }

    let smoothed_tr = wilder_line(&tr_line, period);
    let smoothed_plus = wilder_line(&plus_dm, period);
    let smoothed_minus = wilder_line(&minus_dm, period);

    let di = |dm: &Line| -> Line {
        dm.iter()
            .zip(&smoothed_tr)
            .map(|(d, t)| {
                let (d, t) = ((*d)?, (*t)?);
                Some(if t == 0.0 { 0.0 } else { 100.0 * d / t })
            })
            .collect()
    };
    let plus_di = di(&smoothed_plus);
    let minus_di = di(&smoothed_minus);

    let dx: Line = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| {
            let (p, m) = ((*p)?, (*m)?);
            let sum = p + m;
            Some(if sum == 0.0 { 0.0 } else { 100.0 * (p - m).abs() / sum })
        })
        .collect();

    Ok(AdxResult {
        adx: wilder_line(&dx, period),
        plus_di,
        minus_di,
    })
}

/// Momentum: `close[i] - close[i - period]`.
pub fn momentum(data: &[f64], period: usize) -> Result<Line> {
    check_period("Momentum", period)?;

    Ok((0..data.len())
        .map(|i| (i >= period).then(|| data[i] - data[i - period]))
        .collect())
}

/// Rate of change in percent. A zero base price yields `None`.
pub fn rate_of_change(data: &[f64], period: usize) -> Result<Line> {
    check_period("ROC", period)?;

    Ok((0..data.len())
        .map(|i| {
            if i < period || data[i - period] == 0.0 {
                None
            } else {
                Some((data[i] - data[i - period]) / data[i - period] * 100.0)
            }
        })
        .collect())
}
