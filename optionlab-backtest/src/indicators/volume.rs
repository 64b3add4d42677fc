//! Volume indicators: OBV, VWAP.

use super::{check_lengths, Line, Result};

/// On-Balance Volume, starting at 0 on the first bar.
pub fn obv(close: &[f64], volume: &[f64]) -> Result<Line> {
    check_lengths(close.len(), &[volume.len()])?;

    let mut result = Vec::with_capacity(close.len());
    let mut running = 0.0;
    for i in 0..close.len() {
        if i > 0 {
            if close[i] > close[i - 1] {
                running += volume[i];
            } else if close[i] < close[i - 1] {
                running -= volume[i];
            }
        }
        result.push(Some(running));
    }

    Ok(result)
}

/// Cumulative VWAP of the typical price over the given bars.
///
/// Pass one session's bars to get a session-anchored VWAP. Bars before any
/// volume has traded yield `None`.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Result<Line> {
    check_lengths(close.len(), &[high.len(), low.len(), volume.len()])?;

    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    Ok((0..close.len())
        .map(|i| {
            let typical = (high[i] + low[i] + close[i]) / 3.0;
            cum_pv += typical * volume[i];
            cum_vol += volume[i];
            (cum_vol > 0.0).then(|| cum_pv / cum_vol)
        })
        .collect())
}
