//! Tabular export of backtest output.
//!
//! The trade log, the per-leg log and the equity curve become polars
//! DataFrames written as CSV; the full result is written as pretty JSON.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::backtest::{BacktestResult, EquityPoint, TradeRecord};
use crate::data::Bar;
use crate::indicators::IndicatorOutput;

/// Export errors.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files written by [`export_result`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub trades: PathBuf,
    pub legs: PathBuf,
    pub equity: PathBuf,
    pub json: PathBuf,
}

fn money(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn opt_money(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|v| v.to_f64())
}

fn opt_time(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// One row per simulated day.
pub fn trades_frame(trades: &[TradeRecord]) -> PolarsResult<DataFrame> {
    let date: Vec<String> = trades.iter().map(|t| t.date.to_string()).collect();
    let expiry: Vec<Option<String>> = trades
        .iter()
        .map(|t| t.expiry.map(|e| e.to_string()))
        .collect();
    let legs: Vec<u32> = trades.iter().map(|t| t.legs.len() as u32).collect();
    let traded: Vec<bool> = trades.iter().map(TradeRecord::traded).collect();
    let gross_pnl: Vec<f64> = trades.iter().map(|t| money(t.gross_pnl)).collect();
    let brokerage: Vec<f64> = trades.iter().map(|t| money(t.brokerage)).collect();
    let slippage: Vec<f64> = trades.iter().map(|t| money(t.slippage)).collect();
    let net_pnl: Vec<f64> = trades.iter().map(|t| money(t.net_pnl)).collect();
    let exit_reason: Vec<Option<&str>> = trades
        .iter()
        .map(|t| t.exit_reason.map(|r| r.as_str()))
        .collect();
    let partial_data: Vec<bool> = trades.iter().map(|t| t.partial_data).collect();
    let entry_filtered: Vec<bool> = trades.iter().map(|t| t.entry_filtered).collect();

    DataFrame::new(vec![
        Series::new("date".into(), date).into(),
        Series::new("expiry".into(), expiry).into(),
        Series::new("legs".into(), legs).into(),
        Series::new("traded".into(), traded).into(),
        Series::new("gross_pnl".into(), gross_pnl).into(),
        Series::new("brokerage".into(), brokerage).into(),
        Series::new("slippage".into(), slippage).into(),
        Series::new("net_pnl".into(), net_pnl).into(),
        Series::new("exit_reason".into(), exit_reason).into(),
        Series::new("partial_data".into(), partial_data).into(),
        Series::new("entry_filtered".into(), entry_filtered).into(),
    ])
}

/// One row per leg per day.
pub fn legs_frame(trades: &[TradeRecord]) -> PolarsResult<DataFrame> {
    let rows: Vec<_> = trades
        .iter()
        .flat_map(|t| t.legs.iter().map(move |leg| (t.date, leg)))
        .collect();

    let date: Vec<String> = rows.iter().map(|(d, _)| d.to_string()).collect();
    let leg: Vec<u32> = rows.iter().map(|(_, l)| l.leg_index as u32).collect();
    let option_type: Vec<&str> = rows.iter().map(|(_, l)| l.option_type.as_str()).collect();
    let action: Vec<&str> = rows.iter().map(|(_, l)| l.action.as_str()).collect();
    let quantity: Vec<u32> = rows.iter().map(|(_, l)| l.quantity).collect();
    let strike: Vec<Option<f64>> = rows.iter().map(|(_, l)| opt_money(l.strike)).collect();
    let entry_time: Vec<Option<String>> =
        rows.iter().map(|(_, l)| opt_time(l.entry_time)).collect();
    let entry_price: Vec<Option<f64>> =
        rows.iter().map(|(_, l)| opt_money(l.entry_price)).collect();
    let entry_fill: Vec<Option<f64>> = rows.iter().map(|(_, l)| opt_money(l.entry_fill)).collect();
    let exit_time: Vec<Option<String>> = rows.iter().map(|(_, l)| opt_time(l.exit_time)).collect();
    let exit_price: Vec<Option<f64>> = rows.iter().map(|(_, l)| opt_money(l.exit_price)).collect();
    let exit_fill: Vec<Option<f64>> = rows.iter().map(|(_, l)| opt_money(l.exit_fill)).collect();
    let exit_reason: Vec<Option<&str>> = rows
        .iter()
        .map(|(_, l)| l.exit_reason.map(|r| r.as_str()))
        .collect();
    let failure: Vec<Option<&str>> = rows
        .iter()
        .map(|(_, l)| l.failure.map(|f| f.as_str()))
        .collect();
    let gross_pnl: Vec<f64> = rows.iter().map(|(_, l)| money(l.gross_pnl)).collect();
    let slippage: Vec<f64> = rows.iter().map(|(_, l)| money(l.slippage)).collect();
    let brokerage: Vec<f64> = rows.iter().map(|(_, l)| money(l.brokerage)).collect();
    let net_pnl: Vec<f64> = rows.iter().map(|(_, l)| money(l.net_pnl)).collect();

    DataFrame::new(vec![
        Series::new("date".into(), date).into(),
        Series::new("leg".into(), leg).into(),
        Series::new("option_type".into(), option_type).into(),
        Series::new("action".into(), action).into(),
        Series::new("quantity".into(), quantity).into(),
        Series::new("strike".into(), strike).into(),
        Series::new("entry_time".into(), entry_time).into(),
        Series::new("entry_price".into(), entry_price).into(),
        Series::new("entry_fill".into(), entry_fill).into(),
        Series::new("exit_time".into(), exit_time).into(),
        Series::new("exit_price".into(), exit_price).into(),
        Series::new("exit_fill".into(), exit_fill).into(),
        Series::new("exit_reason".into(), exit_reason).into(),
        Series::new("failure".into(), failure).into(),
        Series::new("gross_pnl".into(), gross_pnl).into(),
        Series::new("slippage".into(), slippage).into(),
        Series::new("brokerage".into(), brokerage).into(),
        Series::new("net_pnl".into(), net_pnl).into(),
    ])
}

/// One row per equity point.
pub fn equity_frame(curve: &[EquityPoint]) -> PolarsResult<DataFrame> {
    let date: Vec<String> = curve.iter().map(|p| p.date.to_string()).collect();
    let daily_pnl: Vec<f64> = curve.iter().map(|p| money(p.daily_pnl)).collect();
    let cumulative_pnl: Vec<f64> = curve.iter().map(|p| money(p.cumulative_pnl)).collect();
    let drawdown: Vec<f64> = curve.iter().map(|p| money(p.drawdown)).collect();

    DataFrame::new(vec![
        Series::new("date".into(), date).into(),
        Series::new("daily_pnl".into(), daily_pnl).into(),
        Series::new("cumulative_pnl".into(), cumulative_pnl).into(),
        Series::new("drawdown".into(), drawdown).into(),
    ])
}

/// Indicator lines aligned to the bars they were computed from.
pub fn indicator_frame(bars: &[Bar], output: &IndicatorOutput) -> PolarsResult<DataFrame> {
    let timestamp: Vec<String> = bars
        .iter()
        .map(|b| b.timestamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();
    let close: Vec<f64> = bars.iter().map(|b| money(b.close)).collect();

    let mut columns: Vec<Column> = vec![
        Series::new("datetime".into(), timestamp).into(),
        Series::new("close".into(), close).into(),
    ];
    for (name, line) in output.lines() {
        columns.push(Series::new((*name).into(), line.clone()).into());
    }
    DataFrame::new(columns)
}

/// Write a DataFrame as CSV with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), ReportError> {
    let file = fs::File::create(path)?;
    CsvWriter::new(file).include_header(true).finish(df)?;
    Ok(())
}

/// Write the full result as pretty JSON.
pub fn write_json(result: &BacktestResult, path: &Path) -> Result<(), ReportError> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}

/// Write `trades.csv`, `legs.csv`, `equity.csv` and `result.json` into
/// `dir`, prefixed with `prefix` when given.
pub fn export_result(
    result: &BacktestResult,
    dir: &Path,
    prefix: Option<&str>,
) -> Result<ExportPaths, ReportError> {
    fs::create_dir_all(dir)?;
    let name = |file: &str| match prefix {
        Some(p) => dir.join(format!("{}_{}", p, file)),
        None => dir.join(file),
    };
    let paths = ExportPaths {
        trades: name("trades.csv"),
        legs: name("legs.csv"),
        equity: name("equity.csv"),
        json: name("result.json"),
    };

    write_csv(&mut trades_frame(&result.trades)?, &paths.trades)?;
    write_csv(&mut legs_frame(&result.trades)?, &paths.legs)?;
    write_csv(&mut equity_frame(&result.equity_curve)?, &paths.equity)?;
    write_json(result, &paths.json)?;

    info!(dir = %dir.display(), "Exported results");
    Ok(paths)
}
