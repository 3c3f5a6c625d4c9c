//! SplitLab Runner — configuration, data loading, parallel comparison,
//! metrics, and artifact export.
//!
//! This crate builds on `splitlab-core` to provide:
//! - TOML backtest configuration
//! - Price loading with cache/download/synthetic fallback
//! - A comparison runner executing every strategy in parallel
//! - Drawdown and return metrics against contributed principal
//! - JSON, CSV and Markdown artifacts

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use config::{BacktestConfig, BacktestSection, ConfigError};
pub use data_loader::{load_closes, load_prices, LoadError, LoadOptions, LoadedData};
pub use export::{load_artifacts, save_artifacts};
pub use metrics::StrategySummary;
pub use runner::{
    run_comparison, run_comparison_from_data, ComparisonReport, RunError, StrategyRun,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<ComparisonReport>();
        assert_sync::<ComparisonReport>();
        assert_send::<StrategySummary>();
        assert_sync::<StrategySummary>();
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
    }

    #[test]
    fn error_types_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
