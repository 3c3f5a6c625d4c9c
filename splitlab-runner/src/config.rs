//! Serializable backtest configuration.
//!
//! A run is described by one TOML file:
//!
//! ```toml
//! [backtest]
//! ticker = "TQQQ"
//! benchmark = "QQQ"
//! start = "2015-01-02"
//! initial_capital = 10000.0
//! monthly_amount = 500.0
//! deposit_day = 10
//!
//! [sentiment]
//! type = "constant"
//! value = 25.0
//!
//! [[strategy]]
//! type = "staged_v1"
//! splits = 30
//! ```
//!
//! Without any `[[strategy]]` table the full default line-up runs.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use splitlab_core::sentiment::SentimentSource;
use splitlab_core::{CapitalPlan, EngineError, StrategyConfig};
use thiserror::Error;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

pub const DEFAULT_BENCHMARK: &str = "QQQ";
pub const DEFAULT_SMA_PERIOD: usize = 200;
pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_DEPOSIT_DAY: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Market, date range and cash-flow plan shared by every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    pub ticker: String,

    /// Index used by the risk-adjusted rebalancer.
    #[serde(default = "default_benchmark")]
    pub benchmark: String,

    /// First date requested (inclusive).
    pub start: NaiveDate,

    /// Last date requested (inclusive). Open-ended runs end today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,

    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,

    #[serde(default)]
    pub monthly_amount: f64,

    #[serde(default = "default_deposit_day")]
    pub deposit_day: u32,

    /// Benchmark moving-average window.
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
}

fn default_benchmark() -> String {
    DEFAULT_BENCHMARK.to_string()
}

fn default_initial_capital() -> f64 {
    DEFAULT_INITIAL_CAPITAL
}

fn default_deposit_day() -> u32 {
    DEFAULT_DEPOSIT_DAY
}

fn default_sma_period() -> usize {
    DEFAULT_SMA_PERIOD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,

    /// Overrides the sentiment source of every risk-adjusted entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentSource>,

    #[serde(default, rename = "strategy", skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategyConfig>,
}

impl BacktestConfig {
    /// Config with the default line-up and no monthly deposits.
    pub fn new(ticker: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            backtest: BacktestSection {
                ticker: ticker.into(),
                benchmark: default_benchmark(),
                start,
                end: None,
                initial_capital: DEFAULT_INITIAL_CAPITAL,
                monthly_amount: 0.0,
                deposit_day: DEFAULT_DEPOSIT_DAY,
                sma_period: DEFAULT_SMA_PERIOD,
            },
            sentiment: None,
            strategies: Vec::new(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn plan(&self) -> CapitalPlan {
        CapitalPlan::new(
            self.backtest.initial_capital,
            self.backtest.monthly_amount,
            self.backtest.deposit_day,
        )
    }

    /// End of the requested range, `today` when open-ended.
    pub fn end_date(&self, today: NaiveDate) -> NaiveDate {
        self.backtest.end.unwrap_or(today)
    }

    /// Strategies to run, in order: the configured list or the default
    /// line-up, with the top-level sentiment applied.
    pub fn resolved_strategies(&self) -> Vec<StrategyConfig> {
        let mut strategies = if self.strategies.is_empty() {
            StrategyConfig::default_lineup()
        } else {
            self.strategies.clone()
        };
        if let Some(sentiment) = &self.sentiment {
            for strategy in &mut strategies {
                if let StrategyConfig::RiskRebalance(params) = strategy {
                    params.sentiment = sentiment.clone();
                }
            }
        }
        strategies
    }

    /// True when some configured strategy reads the benchmark.
    pub fn needs_benchmark(&self) -> bool {
        self.resolved_strategies()
            .iter()
            .any(StrategyConfig::needs_benchmark)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.backtest;
        if bt.ticker.trim().is_empty() {
            return Err(ConfigError::Invalid("ticker must not be empty".into()));
        }
        if let Some(end) = bt.end {
            if end < bt.start {
                return Err(ConfigError::Invalid(format!(
                    "end date {end} is before start date {}",
                    bt.start
                )));
            }
        }
        if bt.sma_period == 0 {
            return Err(ConfigError::Invalid("sma_period must be at least 1".into()));
        }
        if self.needs_benchmark() && bt.benchmark.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "benchmark must be set for risk_rebalance".into(),
            ));
        }
        self.plan().validate()?;
        for strategy in self.resolved_strategies() {
            strategy.build(&bt.ticker)?;
        }
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
