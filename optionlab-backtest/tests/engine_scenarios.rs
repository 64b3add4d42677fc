//! End-to-end scenarios over CSV fixtures: spot file plus an expiry-folder
//! or combined option layout, run through the public engine API.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use optionlab_backtest::backtest::{
    BacktestConfig, BacktestEngine, BrokerageModel, ExitReason, LegFailure, SlippageModel,
    TriggerPrice,
};
use optionlab_backtest::data::{
    CombinedCsvSource, ExpiryFolderSource, MarketData, OptionType, SpotCsvFile,
};
use optionlab_backtest::strategy::{
    resolve_strike, Action, StrategyConfig, StrategyLeg, StrikeSelection,
};

const HEADER: &str = "datetime,open,high,low,close,volume\n";
const TRADE_DATE: &str = "2024-01-18";

/// Bar rows as (time, open, high, low, close).
type Rows<'a> = &'a [(&'a str, f64, f64, f64, f64)];

fn bar_lines(date: &str, rows: Rows) -> String {
    rows.iter()
        .map(|(time, o, h, l, c)| {
            format!("{} {}:00,{:.2},{:.2},{:.2},{:.2},100\n", date, time, o, h, l, c)
        })
        .collect()
}

fn write_csv(path: &Path, rows: Rows) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("{}{}", HEADER, bar_lines(TRADE_DATE, rows))).unwrap();
}

fn flat(time: &'static str, price: f64) -> (&'static str, f64, f64, f64, f64) {
    (time, price, price, price, price)
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Spot flat at 21500 all session, one expiry folder.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            &dir.path().join("spot.csv"),
            &[
                flat("09:15", 21500.0),
                flat("09:20", 21500.0),
                flat("10:00", 21500.0),
                flat("15:15", 21500.0),
            ],
        );
        Self { dir }
    }

    fn option(self, file: &str, rows: Rows) -> Self {
        write_csv(&self.dir.path().join("options/2024-01-25").join(file), rows);
        self
    }

    fn market(&self) -> MarketData {
        let spot = SpotCsvFile::open(self.dir.path().join("spot.csv")).unwrap();
        let chain = ExpiryFolderSource::open(self.dir.path().join("options")).unwrap();
        MarketData::new(spot, chain).unwrap()
    }
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn leg(option_type: OptionType, stoploss: Option<f64>, target: Option<f64>) -> StrategyLeg {
    StrategyLeg {
        option_type,
        strike_selection: StrikeSelection::Atm,
        strike_offset: 0,
        action: Action::Sell,
        lots: 1,
        entry_time: time(9, 20),
        exit_time: time(15, 15),
        stoploss_percent: stoploss,
        target_percent: target,
    }
}

fn zero_cost() -> BacktestConfig {
    BacktestConfig {
        slippage: SlippageModel::zero(),
        brokerage: BrokerageModel::zero(),
        ..Default::default()
    }
}

fn run(fixture: &Fixture, config: BacktestConfig, strategy: StrategyConfig) -> Vec<Decimal> {
    let result = BacktestEngine::new(config, strategy)
        .unwrap()
        .run(&fixture.market())
        .unwrap();
    result.trades.iter().map(|t| t.net_pnl).collect()
}

fn call_fixture() -> Fixture {
    Fixture::new().option(
        "21500_CE.csv",
        &[
            flat("09:20", 100.0),
            flat("10:00", 131.0),
            flat("15:15", 80.0),
        ],
    )
}

#[test]
fn short_call_held_to_exit_time() {
    let strategy = StrategyConfig {
        legs: vec![leg(OptionType::Call, None, None)],
        ..Default::default()
    };
    assert_eq!(run(&call_fixture(), zero_cost(), strategy), vec![dec!(500)]);
}

#[test]
fn short_call_stopped_out() {
    let strategy = StrategyConfig {
        legs: vec![leg(OptionType::Call, Some(30.0), None)],
        ..Default::default()
    };
    let result = BacktestEngine::new(zero_cost(), strategy)
        .unwrap()
        .run(&call_fixture().market())
        .unwrap();

    let record = &result.trades[0];
    let position = &record.legs[0];
    assert_eq!(position.exit_reason, Some(ExitReason::Stoploss));
    assert_eq!(
        position.exit_time,
        NaiveDate::from_ymd_opt(2024, 1, 18)
            .unwrap()
            .and_hms_opt(10, 0, 0)
    );
    assert_eq!(position.exit_price, Some(dec!(131)));
    assert_eq!(record.net_pnl, dec!(-775));
    assert_eq!(record.exit_reason, Some(ExitReason::Stoploss));
}

#[test]
fn stopped_out_with_default_costs() {
    let strategy = StrategyConfig {
        legs: vec![leg(OptionType::Call, Some(30.0), None)],
        ..Default::default()
    };
    // Slippage 0.05% on 100 and 131 over 25 units, plus two orders of 20.
    let expected = dec!(-775) - dec!(1.25) - dec!(1.6375) - dec!(40);
    assert_eq!(
        run(&call_fixture(), BacktestConfig::default(), strategy),
        vec![expected]
    );
}

#[test]
fn straddle_combined_stoploss_closes_both_legs() {
    // Neither leg reaches its own 50% stop.
    let fixture = Fixture::new()
        .option(
            "21500_CE.csv",
            &[
                flat("09:20", 100.0),
                flat("10:00", 130.0),
                flat("15:15", 80.0),
            ],
        )
        .option(
            "21500_PE.csv",
            &[
                flat("09:20", 100.0),
                flat("10:00", 125.0),
                flat("15:15", 90.0),
            ],
        );
    let strategy = StrategyConfig {
        legs: vec![
            leg(OptionType::Call, Some(50.0), None),
            leg(OptionType::Put, Some(50.0), None),
        ],
        combined_sl_percent: Some(25.0),
        ..Default::default()
    };
    let result = BacktestEngine::new(zero_cost(), strategy)
        .unwrap()
        .run(&fixture.market())
        .unwrap();

    let record = &result.trades[0];
    assert_eq!(record.exit_reason, Some(ExitReason::CombinedExit));
    for position in &record.legs {
        assert_eq!(position.exit_reason, Some(ExitReason::CombinedExit));
        assert_eq!(position.exit_time, record.legs[0].exit_time);
    }
    // (100 - 130) + (100 - 125) per unit, 25 units.
    assert_eq!(record.net_pnl, dec!(-1375));
}

#[test]
fn stoploss_beats_target_on_the_same_bar() {
    let fixture = Fixture::new().option(
        "21500_CE.csv",
        &[
            flat("09:20", 100.0),
            ("10:00", 100.0, 140.0, 60.0, 100.0),
            flat("15:15", 100.0),
        ],
    );
    let strategy = StrategyConfig {
        legs: vec![leg(OptionType::Call, Some(30.0), Some(30.0))],
        ..Default::default()
    };
    let config = BacktestConfig {
        trigger_price: TriggerPrice::Extremes,
        ..zero_cost()
    };
    let result = BacktestEngine::new(config, strategy)
        .unwrap()
        .run(&fixture.market())
        .unwrap();
    assert_eq!(
        result.trades[0].legs[0].exit_reason,
        Some(ExitReason::Stoploss)
    );
    assert!(result.trades[0].net_pnl < Decimal::ZERO);
}

#[test]
fn zero_legs_yield_sentinel_metrics() {
    let result = BacktestEngine::new(zero_cost(), StrategyConfig::default())
        .unwrap()
        .run(&call_fixture().market())
        .unwrap();
    let m = &result.metrics;
    assert_eq!(m.net_pnl, Decimal::ZERO);
    assert_eq!(m.traded_days, 0);
    assert_eq!(m.win_rate, 0.0);
    assert_eq!(m.profit_factor, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.sortino_ratio, 0.0);
    assert_eq!(m.calmar_ratio, 0.0);
    assert_eq!(m.max_drawdown, Decimal::ZERO);
}

#[test]
fn unavailable_strike_is_recorded_as_missing() {
    let strategy = StrategyConfig {
        legs: vec![
            leg(OptionType::Call, None, None),
            StrategyLeg {
                strike_selection: StrikeSelection::Otm,
                strike_offset: 4,
                ..leg(OptionType::Call, None, None)
            },
        ],
        ..Default::default()
    };
    let result = BacktestEngine::new(zero_cost(), strategy)
        .unwrap()
        .run(&call_fixture().market())
        .unwrap();

    let record = &result.trades[0];
    assert!(record.partial_data);
    assert_eq!(record.legs[1].exit_reason, Some(ExitReason::DataMissing));
    assert_eq!(record.legs[1].failure, Some(LegFailure::StrikeUnavailable));
    assert_eq!(record.legs[1].net_pnl, Decimal::ZERO);
    assert_eq!(record.net_pnl, dec!(500));
}

#[test]
fn strike_resolution_is_idempotent_and_asymmetric() {
    let step = dec!(50);
    for spot in [dec!(21480), dec!(21500), dec!(21520)] {
        let first = resolve_strike(StrikeSelection::Otm, 2, OptionType::Call, spot, step);
        let second = resolve_strike(StrikeSelection::Otm, 2, OptionType::Call, spot, step);
        assert_eq!(first, second);
        assert_eq!(first, dec!(21600));
        assert_eq!(
            resolve_strike(StrikeSelection::Otm, 2, OptionType::Put, spot, step),
            dec!(21400)
        );
        assert_eq!(
            resolve_strike(StrikeSelection::Itm, 1, OptionType::Put, spot, step),
            dec!(21550)
        );
    }
}

#[test]
fn folder_and_combined_layouts_agree() {
    // Spot on the 18th and 19th, option rows on the 18th only.
    let dir = tempfile::tempdir().unwrap();
    let spot_rows = [
        flat("09:15", 21500.0),
        flat("09:20", 21500.0),
        flat("15:15", 21500.0),
    ];
    let spot = format!(
        "{}{}{}",
        HEADER,
        bar_lines(TRADE_DATE, &spot_rows),
        bar_lines("2024-01-19", &spot_rows)
    );
    fs::write(dir.path().join("spot.csv"), spot).unwrap();

    let option_rows = [flat("09:20", 100.0), flat("15:15", 80.0)];
    write_csv(
        &dir.path().join("options/2024-01-25/21500_CE.csv"),
        &option_rows,
    );
    let mut combined = "datetime,symbol,open,high,low,close,volume,oi\n".to_string();
    for (time, o, h, l, c) in option_rows {
        combined.push_str(&format!(
            "{} {}:00,NIFTY24012521500CE,{:.2},{:.2},{:.2},{:.2},100,0\n",
            TRADE_DATE, time, o, h, l, c
        ));
    }
    fs::write(dir.path().join("options.csv"), combined).unwrap();

    let strategy = StrategyConfig {
        legs: vec![leg(OptionType::Call, None, None)],
        ..Default::default()
    };
    let engine = BacktestEngine::new(zero_cost(), strategy).unwrap();
    let spot = || SpotCsvFile::open(dir.path().join("spot.csv")).unwrap();

    let folder_market = MarketData::new(
        spot(),
        ExpiryFolderSource::open(dir.path().join("options")).unwrap(),
    )
    .unwrap();
    let combined_market = MarketData::new(
        spot(),
        CombinedCsvSource::open(dir.path().join("options.csv")).unwrap(),
    )
    .unwrap();
    let folder = engine.run(&folder_market).unwrap();
    let combined = engine.run(&combined_market).unwrap();

    assert_eq!(combined.trades.len(), 1);
    assert_eq!(combined.net_pnl(), dec!(500));
    assert_eq!(combined.trades[0].exit_reason, Some(ExitReason::Time));
    assert_eq!(folder.trades, combined.trades);
    assert_eq!(folder.metrics, combined.metrics);
    assert_eq!(folder.skipped_days, combined.skipped_days);
}
