//! Comparison runner — wires together data loading, the simulators, and
//! metrics.
//!
//! Two entry points:
//! - `run_comparison()`: loads prices through the cache/provider, then runs.
//!   Used by the CLI.
//! - `run_comparison_from_data()`: takes pre-loaded data, no I/O.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use splitlab_core::data::{DataProvider, DataSource, ParquetCache};
use splitlab_core::{
    principal_curve, CapitalPlan, EngineError, SimulationInput, SimulationResult, StrategyConfig,
};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{load_prices, LoadError, LoadOptions, LoadedData};
use crate::metrics::StrategySummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("simulation error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// One strategy's configuration, raw result, and summary row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRun {
    pub config: StrategyConfig,
    pub summary: StrategySummary,
    pub result: SimulationResult,
}

/// Everything a comparison produced, in configured strategy order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub ticker: String,
    pub benchmark: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub plan: CapitalPlan,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub sources: BTreeMap<String, DataSource>,
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<f64>,
    /// Contributed principal per day.
    pub principal: Vec<f64>,
    pub runs: Vec<StrategyRun>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ComparisonReport {
    pub fn summaries(&self) -> Vec<&StrategySummary> {
        self.runs.iter().map(|r| &r.summary).collect()
    }

    /// Strategy with the highest final equity.
    pub fn best(&self) -> Option<&StrategySummary> {
        self.summaries()
            .into_iter()
            .max_by(|a, b| a.final_equity.total_cmp(&b.final_equity))
    }
}

/// Load prices for `config` and run every strategy.
pub fn run_comparison(
    config: &BacktestConfig,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<ComparisonReport, RunError> {
    config.validate()?;
    let bt = &config.backtest;
    let benchmark = config
        .needs_benchmark()
        .then_some((bt.benchmark.as_str(), bt.sma_period));
    let loaded = load_prices(&bt.ticker, benchmark, cache, provider, opts)?;
    run_comparison_from_data(config, &loaded)
}

/// Run every configured strategy over pre-loaded data — no I/O.
///
/// Strategies run in parallel; the report keeps the configured order.
pub fn run_comparison_from_data(
    config: &BacktestConfig,
    loaded: &LoadedData,
) -> Result<ComparisonReport, RunError> {
    let plan = config.plan();
    let prices = &loaded.prices;
    let mut input = SimulationInput::new(prices, plan);
    if let Some(bench) = &loaded.benchmark {
        input = input.with_benchmark(bench);
    }
    input.validate()?;

    let strategies = config.resolved_strategies();
    let names = unique_names(strategies.iter().map(StrategyConfig::kind));
    let principal = principal_curve(prices, &plan);

    info!(
        ticker = prices.symbol(),
        days = prices.len(),
        strategies = strategies.len(),
        synthetic = loaded.has_synthetic,
        "running comparison"
    );

    let runs = strategies
        .par_iter()
        .zip(names.par_iter())
        .map(|(strategy, name)| {
            let simulator = strategy.build(&config.backtest.ticker)?;
            let mut result = simulator.simulate(&input)?;
            result.strategy = name.clone();
            let summary = StrategySummary::compute(&result, &principal);
            Ok(StrategyRun {
                config: strategy.clone(),
                summary,
                result,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let report = ComparisonReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        ticker: prices.symbol().to_string(),
        benchmark: loaded.benchmark.as_ref().map(|b| b.symbol.clone()),
        start_date: prices.first().date,
        end_date: prices.last().date,
        plan,
        dataset_hash: loaded.dataset_hash.clone(),
        has_synthetic: loaded.has_synthetic,
        sources: loaded.sources.clone(),
        dates: prices.dates(),
        prices: prices.prices(),
        principal,
        runs,
    };

    if let Some(best) = report.best() {
        info!(
            best = %best.strategy,
            final_equity = best.final_equity,
            principal = best.final_principal,
            "comparison finished"
        );
    }
    Ok(report)
}

/// Display names unique within a run: repeats of a kind get `#2`, `#3`, ...
fn unique_names<'a>(kinds: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    kinds
        .map(|kind| {
            let count = seen.entry(kind).or_insert(0);
            *count += 1;
            if *count == 1 {
                kind.to_string()
            } else {
                format!("{kind}#{count}")
            }
        })
        .collect()
}
