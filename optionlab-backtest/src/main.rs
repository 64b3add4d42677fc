//! # Run a single backtest
//! optionlab-backtest run --strategy strategies/straddle.toml --spot data/nifty.csv --options data/options
//!
//! # Run several strategies over the same data
//! optionlab-backtest batch --strategy a.toml --strategy b.toml --spot data/nifty.csv --options data/options.csv
//!
//! # Compute an indicator over the spot series
//! optionlab-backtest indicator --spot data/nifty.csv --spec '{"name": "RSI", "period": 14}'
//!
//! # Describe a dataset
//! optionlab-backtest inspect --spot data/nifty.csv --options data/options

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use optionlab_backtest::backtest::{run_batch, BacktestConfig, BacktestEngine, InstrumentSpec};
use optionlab_backtest::data::{
    CombinedCsvSource, ExpiryFolderSource, MarketData, OptionType, SpotCsvFile, SpotCsvFolder,
    SpotSource,
};
use optionlab_backtest::indicators::{IndicatorSpec, Ohlcv};
use optionlab_backtest::report::{export_result, indicator_frame, write_csv};
use optionlab_backtest::strategy::{load_config, StrategyConfig};

#[derive(Parser)]
#[command(name = "optionlab-backtest")]
#[command(about = "Intraday multi-leg options backtester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Spot CSV file, or folder of per-date CSVs
    #[arg(long)]
    spot: PathBuf,

    /// Options folder (<expiry>/<strike>_<CE|PE>.csv) or combined options CSV
    #[arg(long)]
    options: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Backtest settings file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Instrument preset (NIFTY, BANKNIFTY), overrides the settings file
    #[arg(long)]
    instrument: Option<String>,

    /// First trade date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last trade date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Simulate days in parallel
    #[arg(long)]
    parallel: bool,

    /// Directory for CSV and JSON exports
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest
    Run {
        /// Strategy file (.toml or .json)
        #[arg(short, long)]
        strategy: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run several strategies concurrently over one dataset
    Batch {
        /// Strategy files (.toml or .json)
        #[arg(short, long, required = true)]
        strategy: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Compute an indicator over the spot series
    Indicator {
        /// Spot CSV file, or folder of per-date CSVs
        #[arg(long)]
        spot: PathBuf,

        /// Indicator as JSON, e.g. '{"name": "MACD", "fast": 12, "slow": 26}'
        #[arg(long)]
        spec: String,

        /// Only this date
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Write the lines to this CSV instead of printing the tail
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List expiries, strikes and spot dates of a dataset
    Inspect {
        #[command(flatten)]
        data: DataArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("optionlab_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { strategy, run } => {
            let strategy = StrategyConfig::from_file(&strategy)
                .with_context(|| format!("loading strategy {}", strategy.display()))?;
            let config = backtest_config(&run)?;
            let data = open_market(&run.data)?;

            let engine = BacktestEngine::new(config, strategy)?;
            let result = engine.run(&data)?;
            println!("{}", result.summary());

            if let Some(dir) = &run.output {
                let paths = export_result(&result, dir, None)?;
                println!("\nTrades written to {}", paths.trades.display());
            }
        }
        Commands::Batch { strategy, run } => {
            let strategies = strategy
                .iter()
                .map(|path| {
                    StrategyConfig::from_file(path)
                        .with_context(|| format!("loading strategy {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let config = backtest_config(&run)?;
            let data = open_market(&run.data)?;

            println!(
                "{:<24} {:>6} {:>14} {:>8} {:>8} {:>12}",
                "strategy", "days", "net_pnl", "win%", "sharpe", "max_dd"
            );
            for (strategy, result) in strategies.iter().zip(run_batch(&config, &strategies, &data)) {
                let result = result.with_context(|| format!("running {}", strategy.name))?;
                let m = &result.metrics;
                println!(
                    "{:<24} {:>6} {:>14.2} {:>8.1} {:>8.2} {:>12.2}",
                    strategy.name,
                    m.total_days,
                    m.net_pnl,
                    m.win_rate * 100.0,
                    m.sharpe_ratio,
                    m.max_drawdown,
                );
                if let Some(dir) = &run.output {
                    export_result(&result, dir, Some(&file_prefix(&strategy.name)))?;
                }
            }
        }
        Commands::Indicator {
            spot,
            spec,
            date,
            output,
        } => {
            let indicator: IndicatorSpec =
                serde_json::from_str(&spec).context("parsing indicator spec")?;
            indicator.validate()?;

            let source = open_spot(&spot)?;
            let dates = match date {
                Some(d) => vec![d],
                None => source.dates()?,
            };
            let mut bars = Vec::new();
            for d in dates {
                bars.extend(source.load_session(d)?);
            }
            if bars.is_empty() {
                bail!("no spot bars in {}", spot.display());
            }

            let out = indicator.compute(&Ohlcv::from_bars(&bars))?;
            let mut df = indicator_frame(&bars, &out)?;
            match output {
                Some(path) => {
                    write_csv(&mut df, &path)?;
                    println!("{} written to {}", indicator, path.display());
                }
                None => println!("{}\n{}", indicator, df.tail(Some(10))),
            }
        }
        Commands::Inspect { data } => {
            let market = open_market(&data)?;
            let dates = market.spot_dates()?;
            println!(
                "Spot dates: {} ({} to {})",
                dates.len(),
                fmt_date(dates.first()),
                fmt_date(dates.last())
            );
            let expiries = market.expiries();
            println!(
                "Expiries: {} ({} to {})",
                expiries.len(),
                fmt_date(expiries.first()),
                fmt_date(expiries.last())
            );
            for expiry in expiries {
                let calls = market.strikes(*expiry, OptionType::Call)?;
                let puts = market.strikes(*expiry, OptionType::Put)?;
                println!(
                    "  {}: {} CE / {} PE strikes ({} to {})",
                    expiry,
                    calls.len(),
                    puts.len(),
                    calls
                        .first()
                        .map_or_else(|| "-".to_string(), |s| s.to_string()),
                    calls
                        .last()
                        .map_or_else(|| "-".to_string(), |s| s.to_string()),
                );
            }
        }
    }

    Ok(())
}

fn backtest_config(args: &RunArgs) -> Result<BacktestConfig> {
    let mut config: BacktestConfig = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading backtest config {}", path.display()))?,
        None => BacktestConfig::default(),
    };
    if let Some(symbol) = &args.instrument {
        config.instrument = InstrumentSpec::preset(symbol)
            .with_context(|| format!("unknown instrument {}", symbol))?;
    }
    if args.start.is_some() {
        config.start_date = args.start;
    }
    if args.end.is_some() {
        config.end_date = args.end;
    }
    if args.parallel {
        config.parallel_days = true;
    }
    Ok(config)
}

fn open_spot(path: &Path) -> Result<Box<dyn SpotSource>> {
    let source: Box<dyn SpotSource> = if path.is_dir() {
        Box::new(SpotCsvFolder::open(path)?)
    } else {
        Box::new(SpotCsvFile::open(path)?)
    };
    Ok(source)
}

fn open_market(args: &DataArgs) -> Result<MarketData> {
    let spot_dir = args.spot.is_dir();
    let options_dir = args.options.is_dir();
    let market = match (spot_dir, options_dir) {
        (true, true) => MarketData::new(
            SpotCsvFolder::open(&args.spot)?,
            ExpiryFolderSource::open(&args.options)?,
        ),
        (true, false) => MarketData::new(
            SpotCsvFolder::open(&args.spot)?,
            CombinedCsvSource::open(&args.options)?,
        ),
        (false, true) => MarketData::new(
            SpotCsvFile::open(&args.spot)?,
            ExpiryFolderSource::open(&args.options)?,
        ),
        (false, false) => MarketData::new(
            SpotCsvFile::open(&args.spot)?,
            CombinedCsvSource::open(&args.options)?,
        ),
    };
    market.with_context(|| format!("opening option data {}", args.options.display()))
}

fn fmt_date(date: Option<&NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn file_prefix(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
