//! Result export: CSV tables through polars, full results as JSON.

pub mod export;

pub use export::{
    equity_frame, export_result, indicator_frame, legs_frame, trades_frame, write_csv,
    write_json, ExportPaths, ReportError,
};
