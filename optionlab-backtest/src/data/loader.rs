//! CSV loading for spot and option minute bars.
//!
//! Files are read with polars and converted row by row into [`Bar`]s.
//! Column names are matched case-insensitively after trimming, so
//! `Datetime`, ` close` and `CLOSE` all resolve. The expected contract is:
//! - datetime (or date / time / timestamp), open, high, low, close, volume
//! - oi (optional, options only)
//! - symbol (combined option files only)

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use super::types::Bar;

/// Accepted names for the timestamp column, in priority order.
pub const DATETIME_COLUMNS: &[&str] = &["datetime", "date", "time", "timestamp"];

/// Required price columns.
pub const PRICE_COLUMNS: &[&str] = &["open", "high", "low", "close"];

/// Accepted timestamp formats.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

/// Decimal places kept when converting CSV floats to prices.
const PRICE_SCALE: u32 = 6;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data not found: {0}")]
    DataNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a timestamp in any of the accepted formats.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Convert a CSV float into a price.
pub fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_SCALE).normalize())
}

/// Read a CSV file into a DataFrame.
pub fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    if !path.exists() {
        return Err(DataError::DataNotFound(path.display().to_string()));
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Read a single-instrument bar file (spot file or one option contract).
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let df = read_frame(path)?;
    let rows = frame_to_rows(&df, &path.display().to_string(), false)?;
    Ok(finalize_bars(rows.into_iter().map(|(_, bar)| bar).collect()))
}

/// Read a combined option file, grouping bars by their `symbol` column.
pub fn read_symbol_bars(path: &Path) -> Result<HashMap<String, Vec<Bar>>, DataError> {
    let df = read_frame(path)?;
    let rows = frame_to_rows(&df, &path.display().to_string(), true)?;

    let mut grouped: HashMap<String, Vec<Bar>> = HashMap::new();
    for (symbol, bar) in rows {
        if let Some(symbol) = symbol {
            grouped.entry(symbol).or_default().push(bar);
        }
    }
    Ok(grouped
        .into_iter()
        .map(|(symbol, bars)| (symbol, finalize_bars(bars)))
        .collect())
}

/// Sort by timestamp and keep the first bar of any duplicated timestamp.
pub fn finalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

fn find_column<'a>(df: &'a DataFrame, names: &[&str]) -> Option<&'a Column> {
    names.iter().find_map(|wanted| {
        df.get_columns()
            .iter()
            .find(|c| c.name().as_str().trim().eq_ignore_ascii_case(wanted))
    })
}

fn require_column<'a>(
    df: &'a DataFrame,
    names: &[&str],
    source: &str,
) -> Result<&'a Column, DataError> {
    find_column(df, names).ok_or_else(|| {
        DataError::InvalidData(format!("{}: missing column '{}'", source, names[0]))
    })
}

fn float_values(column: &Column) -> Result<Vec<Option<f64>>, DataError> {
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

fn string_values(column: &Column) -> Result<Vec<Option<String>>, DataError> {
    let cast = column.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|s| s.map(|s| s.trim().to_string()))
        .collect())
}

/// Convert every usable row of `df` into a bar, optionally tagged with its symbol.
///
/// Rows with an unparsable timestamp, a missing price, or prices violating
/// the OHLC invariant are dropped and counted in a single warning.
fn frame_to_rows(
    df: &DataFrame,
    source: &str,
    with_symbol: bool,
) -> Result<Vec<(Option<String>, Bar)>, DataError> {
    let timestamps = string_values(require_column(df, DATETIME_COLUMNS, source)?)?;
    let open = float_values(require_column(df, &["open"], source)?)?;
    let high = float_values(require_column(df, &["high"], source)?)?;
    let low = float_values(require_column(df, &["low"], source)?)?;
    let close = float_values(require_column(df, &["close"], source)?)?;
    let volume = match find_column(df, &["volume"]) {
        Some(c) => float_values(c)?,
        None => vec![None; df.height()],
    };
    let oi = match find_column(df, &["oi", "open_interest"]) {
        Some(c) => Some(float_values(c)?),
        None => None,
    };
    let symbols = if with_symbol {
        Some(string_values(require_column(df, &["symbol"], source)?)?)
    } else {
        None
    };

    let mut rows = Vec::with_capacity(df.height());
    let mut dropped = 0usize;

    for idx in 0..df.height() {
        let parsed = (|| {
            let timestamp = timestamps[idx].as_deref().and_then(parse_datetime)?;
            let bar = Bar {
                timestamp,
                open: open[idx].and_then(to_price)?,
                high: high[idx].and_then(to_price)?,
                low: low[idx].and_then(to_price)?,
                close: close[idx].and_then(to_price)?,
                volume: volume[idx].map(|v| v.round() as i64).unwrap_or(0),
                oi: oi.as_ref().and_then(|c| c[idx]).map(|v| v.round() as i64),
            };
            bar.is_consistent().then_some(bar)
        })();

        match parsed {
            Some(bar) => {
                let symbol = symbols.as_ref().and_then(|s| s[idx].clone());
                rows.push((symbol, bar));
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(source, dropped, "Dropped malformed rows");
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 18)
            .unwrap()
            .and_hms_opt(9, 20, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-01-18 09:20:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-18T09:20:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-18 09:20"), Some(expected));
        assert_eq!(parse_datetime("18-01-2024 09:20"), Some(expected));
        assert_eq!(parse_datetime("not a date"), None);
    }

    #[test]
    fn test_to_price() {
        assert_eq!(to_price(100.05), Some(dec!(100.05)));
        assert_eq!(to_price(21500.0), Some(dec!(21500)));
        assert_eq!(to_price(f64::NAN), None);
    }

    #[test]
    fn test_read_bars_normalizes_columns_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "spot.csv",
            "Datetime, Open,High,Low,Close,Volume\n\
             2024-01-18 09:16:00,101,102,100,101.5,10\n\
             2024-01-18 09:15:00,100,101,99,100.5,20\n\
             2024-01-18 09:15:00,100,101,99,100.5,20\n\
             2024-01-18 09:17:00,100,99,98,99,5\n\
             garbage,1,1,1,1,1\n",
        );

        let bars = read_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, dec!(100.5));
        assert_eq!(bars[1].volume, 10);
        assert_eq!(bars[0].oi, None);
    }

    #[test]
    fn test_read_symbol_bars_groups_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "options.csv",
            "datetime,symbol,open,high,low,close,volume,oi\n\
             2024-01-18 09:15:00,NIFTY24012521500CE,100,101,99,100,10,500\n\
             2024-01-18 09:15:00,NIFTY24012521500PE,90,91,89,90,10,400\n\
             2024-01-18 09:16:00,NIFTY24012521500CE,100,102,99,101,10,510\n",
        );

        let grouped = read_symbol_bars(&path).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["NIFTY24012521500CE"].len(), 2);
        assert_eq!(grouped["NIFTY24012521500PE"][0].oi, Some(400));
    }

    #[test]
    fn test_missing_file_is_data_not_found() {
        let err = read_bars(Path::new("/nonexistent/file.csv")).unwrap_err();
        assert!(matches!(err, DataError::DataNotFound(_)));
    }

    #[test]
    fn test_missing_column_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "bad.csv", "datetime,open,high\n2024-01-18 09:15:00,1,2\n");
        let err = read_bars(&path).unwrap_err();
        assert!(matches!(err, DataError::InvalidData(_)));
    }
}
