//! SplitLab CLI — download, run, and cache management commands.
//!
//! Commands:
//! - `download` — fetch daily closes (Yahoo Finance or CSV) and cache as Parquet
//! - `run` — compare strategies from a TOML config file or command-line flags
//! - `cache status` — report cached symbols, date ranges, and age

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use splitlab_core::data::{
    download_symbols, CircuitBreaker, CsvProvider, DataProvider, ParquetCache, StdoutProgress,
    YahooProvider,
};
use splitlab_core::StrategyConfig;
use splitlab_runner::data_loader::DEFAULT_MAX_AGE_HOURS;
use splitlab_runner::{run_comparison, save_artifacts, BacktestConfig, ComparisonReport, LoadOptions};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "splitlab",
    about = "SplitLab CLI — staged-accumulation and rebalancing strategy backtester"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily closes and cache them as Parquet.
    Download {
        /// Symbols to download (e.g., TQQQ QQQ SOXL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 10 years ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Import `{SYMBOL}.csv` files from this directory instead of Yahoo.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Compare strategies from a TOML config file or flags.
    Run(RunArgs),
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file. Other backtest flags are ignored when set.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticker to backtest.
    #[arg(long, default_value = "TQQQ")]
    ticker: String,

    /// Benchmark index for the risk-adjusted rebalancer.
    #[arg(long, default_value = "QQQ")]
    benchmark: String,

    /// Start date (YYYY-MM-DD). Defaults to 2015-01-02.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    #[arg(long, default_value_t = 10_000.0)]
    initial: f64,

    #[arg(long, default_value_t = 0.0)]
    monthly: f64,

    /// Day of month for deposits (1-28).
    #[arg(long, default_value_t = 1)]
    deposit_day: u32,

    /// Benchmark moving-average window.
    #[arg(long, default_value_t = 200)]
    sma_period: usize,

    /// Strategy to run (repeatable), e.g. `staged_v1`. Defaults to all seven.
    #[arg(long = "strategy")]
    strategies: Vec<String>,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use synthetic data as fallback.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Re-download even if cached.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Cached data older than this is refreshed.
    #[arg(long, default_value_t = DEFAULT_MAX_AGE_HOURS)]
    max_age_hours: u64,

    /// Read `{SYMBOL}.csv` files from this directory instead of Yahoo.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Cache directory. Defaults to ./data.
    #[arg(long, default_value = "data")]
    cache_dir: PathBuf,

    /// Output directory for artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Print the summary without writing artifacts.
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached symbols, date ranges, row counts and age.
    Status {
        /// Symbols to report. Defaults to everything cached.
        symbols: Vec<String>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            symbols,
            start,
            end,
            force,
            csv_dir,
            cache_dir,
        } => run_download(symbols, start, end, force, csv_dir, cache_dir),
        Commands::Run(args) => run_comparison_cmd(args),
        Commands::Cache { action } => match action {
            CacheAction::Status { symbols, cache_dir } => run_cache_status(&cache_dir, &symbols),
        },
    }
}

fn parse_date(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid --{flag} date '{s}' (expected YYYY-MM-DD)"))
        })
        .transpose()
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Yahoo unless a CSV directory is given.
fn make_provider(csv_dir: Option<PathBuf>) -> Result<Box<dyn DataProvider>> {
    match csv_dir {
        Some(dir) => Ok(Box::new(CsvProvider::from_dir(dir))),
        None => {
            let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
            let provider =
                YahooProvider::new(circuit_breaker).context("failed to build Yahoo client")?;
            Ok(Box::new(provider))
        }
    }
}

fn run_download(
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    force: bool,
    csv_dir: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<()> {
    let start_date = parse_date(start.as_deref(), "start")?
        .unwrap_or_else(|| today() - chrono::Duration::days(365 * 10));
    let end_date = parse_date(end.as_deref(), "end")?.unwrap_or_else(today);
    if end_date < start_date {
        bail!("--end {end_date} is before --start {start_date}");
    }

    let provider = make_provider(csv_dir)?;
    let cache = ParquetCache::new(cache_dir);
    let progress = StdoutProgress;
    let sym_refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();

    let summary = download_symbols(
        provider.as_ref(),
        &cache,
        &sym_refs,
        start_date,
        end_date,
        force,
        &progress,
    );

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn build_config(args: &RunArgs) -> Result<BacktestConfig> {
    if let Some(path) = &args.config {
        return BacktestConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let start = match parse_date(args.start.as_deref(), "start")? {
        Some(date) => date,
        None => NaiveDate::from_ymd_opt(2015, 1, 2).context("invalid default start date")?,
    };
    let mut config = BacktestConfig::new(args.ticker.to_ascii_uppercase(), start);
    config.backtest.benchmark = args.benchmark.to_ascii_uppercase();
    config.backtest.end = parse_date(args.end.as_deref(), "end")?;
    config.backtest.initial_capital = args.initial;
    config.backtest.monthly_amount = args.monthly;
    config.backtest.deposit_day = args.deposit_day;
    config.backtest.sma_period = args.sma_period;
    config.strategies = args
        .strategies
        .iter()
        .map(|kind| parse_strategy(kind))
        .collect::<Result<_>>()?;
    config.validate()?;
    Ok(config)
}

/// A strategy kind with default parameters.
fn parse_strategy(kind: &str) -> Result<StrategyConfig> {
    serde_json::from_value(serde_json::json!({ "type": kind })).with_context(|| {
        let valid: Vec<&str> = StrategyConfig::default_lineup()
            .iter()
            .map(StrategyConfig::kind)
            .collect();
        format!("unknown strategy '{kind}'. Valid: {}", valid.join(", "))
    })
}

fn run_comparison_cmd(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let start = config.backtest.start;
    let end = config.end_date(today());

    let opts = LoadOptions {
        start,
        end,
        offline: args.offline,
        synthetic: args.synthetic,
        force: args.force,
        max_age_hours: args.max_age_hours,
    };

    let cache = ParquetCache::new(&args.cache_dir);
    let provider = if args.offline {
        None
    } else {
        Some(make_provider(args.csv_dir.clone())?)
    };

    info!(ticker = %config.backtest.ticker, %start, %end, "starting run");
    let report = run_comparison(&config, &cache, provider.as_deref(), &opts)?;

    print_summary(&report);

    if !args.no_save {
        let run_dir = save_artifacts(&report, &args.output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

fn run_cache_status(cache_dir: &Path, symbols: &[String]) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let listed: Vec<String> = if symbols.is_empty() {
        cache.cached_symbols()
    } else {
        symbols.iter().map(|s| s.to_ascii_uppercase()).collect()
    };
    if listed.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let sym_refs: Vec<&str> = listed.iter().map(|s| s.as_str()).collect();
    println!("Cache: {}", cache_dir.display());
    println!();
    println!(
        "{:<8} {:<25} {:>8} {:>10}",
        "Symbol", "Date Range", "Rows", "Age"
    );
    println!("{}", "-".repeat(54));
    for status in cache.status(&sym_refs) {
        if !status.cached {
            println!("{:<8} {:<25} {:>8} {:>10}", status.symbol, "(not cached)", "-", "-");
            continue;
        }
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ => "(no meta)".into(),
        };
        let rows = status
            .row_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        let age = status
            .age_hours
            .map(format_age)
            .unwrap_or_else(|| "-".into());
        println!("{:<8} {:<25} {:>8} {:>10}", status.symbol, range, rows, age);
    }

    Ok(())
}

fn format_age(hours: f64) -> String {
    if hours < 1.0 {
        format!("{:.0} min", hours * 60.0)
    } else if hours < 48.0 {
        format!("{hours:.1} h")
    } else {
        format!("{:.1} d", hours / 24.0)
    }
}

fn print_summary(report: &ComparisonReport) {
    println!();
    println!("=== Strategy Comparison ===");
    println!("Ticker:         {}", report.ticker);
    if let Some(bench) = &report.benchmark {
        println!("Benchmark:      {bench}");
    }
    println!(
        "Period:         {} to {} ({} days)",
        report.start_date,
        report.end_date,
        report.dates.len()
    );
    println!(
        "Principal:      ${:.0}",
        report.principal.last().copied().unwrap_or(0.0)
    );
    println!();
    println!(
        "{:<18} {:>14} {:>10} {:>9} {:>9} {:>7}",
        "Strategy", "Final Equity", "Return", "CAGR", "MDD", "Trades"
    );
    println!("{}", "-".repeat(72));
    for s in report.summaries() {
        println!(
            "{:<18} {:>14.2} {:>9.2}% {:>8.2}% {:>8.2}% {:>7}",
            s.strategy,
            s.final_equity,
            s.total_return_pct,
            s.cagr_pct,
            s.max_drawdown_pct,
            s.trade_count
        );
    }
    if report.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
