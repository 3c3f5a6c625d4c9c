//! Integration tests for the runner pipeline: cache/provider loading,
//! parallel comparison, and artifact export.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use splitlab_core::data::{CsvProvider, DataSource, ParquetCache, RawClose};
use splitlab_core::strategy::StrategyConfig;
use splitlab_runner::{
    load_artifacts, run_comparison, save_artifacts, BacktestConfig, LoadOptions, RunError,
};

fn weekday_closes(start: NaiveDate, prices: &[f64]) -> Vec<RawClose> {
    let mut date = start;
    let mut out = Vec::with_capacity(prices.len());
    for &price in prices {
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
        out.push(RawClose::new(date, price));
        date += Duration::days(1);
    }
    out
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn wave(n: usize, base: f64) -> Vec<f64> {
    (0..n)
        .map(|i| base + (i as f64 * 0.07).sin() * base * 0.3)
        .collect()
}

fn offline(end: NaiveDate) -> LoadOptions {
    let mut opts = LoadOptions::new(start(), end);
    opts.offline = true;
    opts
}

#[test]
fn cached_comparison_writes_full_artifact_set() {
    let cache_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(cache_dir.path());

    let asset = weekday_closes(start(), &wave(300, 40.0));
    let bench = weekday_closes(start(), &wave(300, 300.0));
    let end = asset.last().unwrap().date;
    cache.write("TQQQ", &asset, DataSource::YahooFinance).unwrap();
    cache.write("QQQ", &bench, DataSource::YahooFinance).unwrap();

    let mut config = BacktestConfig::new("TQQQ", start());
    config.backtest.end = Some(end);
    config.backtest.monthly_amount = 500.0;
    config.backtest.deposit_day = 10;
    config.backtest.sma_period = 50;

    let report = run_comparison(&config, &cache, None, &offline(end)).unwrap();
    assert_eq!(report.runs.len(), 7);
    assert_eq!(report.dates.len(), 300);
    assert_eq!(report.benchmark.as_deref(), Some("QQQ"));
    assert_eq!(report.sources["TQQQ"], DataSource::Cache);
    assert!(!report.has_synthetic);
    // 2023-01-02 .. 2024-02-23: one deposit each month from February 2023.
    assert_eq!(report.end_date, NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
    assert_eq!(*report.principal.last().unwrap(), 10_000.0 + 13.0 * 500.0);

    let run_dir = save_artifacts(&report, out_dir.path()).unwrap();
    for name in ["manifest.json", "equity.csv", "summary.csv", "trades.csv", "report.md"] {
        assert!(run_dir.join(name).exists(), "missing {name}");
    }

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert_eq!(equity.lines().count(), 301);
    assert!(equity
        .lines()
        .next()
        .unwrap()
        .ends_with("tiered_exit,value_rebalance,risk_rebalance"));

    let summary = std::fs::read_to_string(run_dir.join("summary.csv")).unwrap();
    assert_eq!(summary.lines().count(), 8);

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.run_id, report.run_id);
    assert_eq!(loaded.summaries(), report.summaries());
}

#[test]
fn csv_provider_linear_rise_ends_at_15000() {
    let cache_dir = tempfile::tempdir().unwrap();
    let csv_dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(cache_dir.path());

    let prices: Vec<f64> = (0..=100).map(|i| 100.0 + 0.5 * f64::from(i)).collect();
    let closes = weekday_closes(start(), &prices);
    let end = closes.last().unwrap().date;
    let mut csv = String::from("Date,Open,Close,Adj Close\n");
    for c in &closes {
        csv.push_str(&format!("{},1.0,1.0,{}\n", c.date, c.close));
    }
    std::fs::write(csv_dir.path().join("TQQQ.csv"), csv).unwrap();
    let provider = CsvProvider::from_dir(csv_dir.path());

    let mut config = BacktestConfig::new("TQQQ", start());
    config.backtest.end = Some(end);
    config.strategies = vec![StrategyConfig::BuyAndHold];
    assert!(!config.needs_benchmark());

    let opts = LoadOptions::new(start(), end);
    let report = run_comparison(&config, &cache, Some(&provider), &opts).unwrap();
    assert_eq!(report.sources["TQQQ"], DataSource::CsvImport);
    assert!(report.benchmark.is_none());

    let summary = &report.runs[0].summary;
    assert_eq!(summary.final_equity, 15_000.0);
    assert_eq!(summary.final_principal, 10_000.0);
    assert!((summary.total_return_pct - 50.0).abs() < 1e-9);
    assert_eq!(summary.max_drawdown_pct, 0.0);

    // The download landed in the cache.
    assert_eq!(cache.load("TQQQ").unwrap().len(), 101);
}

#[test]
fn synthetic_fallback_is_tagged() {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(cache_dir.path());
    let end = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();

    let mut config = BacktestConfig::new("FAKE", start());
    config.backtest.benchmark = "FAKEIDX".into();
    config.backtest.end = Some(end);

    let mut opts = offline(end);
    opts.synthetic = true;
    let report = run_comparison(&config, &cache, None, &opts).unwrap();
    assert!(report.has_synthetic);
    assert_eq!(report.sources["FAKE"], DataSource::Synthetic);
    assert_eq!(report.sources["FAKEIDX"], DataSource::Synthetic);
    assert_eq!(report.runs.len(), 7);
    assert!(splitlab_runner::export::generate_report(&report).contains("SYNTHETIC"));
}

#[test]
fn offline_without_data_fails_cleanly() {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(cache_dir.path());
    let end = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
    let config = BacktestConfig::new("TQQQ", start());

    let err = run_comparison(&config, &cache, None, &offline(end)).unwrap_err();
    assert!(matches!(err, RunError::Data(_)), "{err}");
}

#[test]
fn config_file_drives_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(dir.path().join("cache"));
    let closes = weekday_closes(start(), &wave(120, 20.0));
    let end = closes.last().unwrap().date;
    cache.write("SOXL", &closes, DataSource::YahooFinance).unwrap();

    let path = dir.path().join("run.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[backtest]
ticker = "SOXL"
start = "{}"
end = "{end}"
monthly_amount = 250.0
deposit_day = 5

[[strategy]]
type = "staged_v3"

[[strategy]]
type = "tiered_exit"
splits = 20

[[strategy]]
type = "staged_v3"
liquidation_days = 3
"#,
            start()
        ),
    )
    .unwrap();

    let config = BacktestConfig::from_file(&path).unwrap();
    let report = run_comparison(&config, &cache, None, &offline(end)).unwrap();
    let names: Vec<&str> = report
        .runs
        .iter()
        .map(|r| r.summary.strategy.as_str())
        .collect();
    assert_eq!(names, vec!["staged_v3", "tiered_exit", "staged_v3#2"]);
    assert!(report.benchmark.is_none());
}
