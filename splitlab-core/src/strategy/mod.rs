//! Strategy simulators.
//!
//! Every strategy is a deterministic, synchronous fold over the price
//! series behind one [`Simulator`] trait. Simulators own all of their state;
//! nothing is shared between strategies, so a runner may execute them in
//! any order or in parallel.
//!
//! Strategies are selected through the tagged [`StrategyConfig`] enum,
//! which is what TOML configs deserialize into.

pub mod book;
pub mod buy_and_hold;
pub mod risk_rebalance;
pub mod staged_v1;
pub mod staged_v2;
pub mod staged_v3;
pub mod tiered_exit;
pub mod value_rebalance;

use serde::{Deserialize, Serialize};

use crate::domain::{BenchmarkSeries, DayState, PriceSeries, TradeEvent};
use crate::error::EngineError;
use crate::schedule::CapitalPlan;

pub use buy_and_hold::BuyAndHold;
pub use risk_rebalance::{RiskRebalance, RiskRebalanceParams};
pub use staged_v1::{StagedV1, StagedV1Params};
pub use staged_v2::{StagedV2, StagedV2Params};
pub use staged_v3::{StagedV3, StagedV3Params};
pub use tiered_exit::{TieredExit, TieredExitParams};
pub use value_rebalance::{ValueRebalance, ValueRebalanceParams};

/// Everything a simulator reads. Borrowed, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct SimulationInput<'a> {
    pub prices: &'a PriceSeries,
    pub benchmark: Option<&'a BenchmarkSeries>,
    pub plan: CapitalPlan,
}

impl<'a> SimulationInput<'a> {
    pub fn new(prices: &'a PriceSeries, plan: CapitalPlan) -> Self {
        Self {
            prices,
            benchmark: None,
            plan,
        }
    }

    pub fn with_benchmark(mut self, benchmark: &'a BenchmarkSeries) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    /// Checks the plan and, when present, that the benchmark lines up
    /// with the price series.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.plan.validate()?;
        if let Some(bench) = self.benchmark {
            if bench.len() != self.prices.len() {
                return Err(EngineError::BenchmarkMismatch {
                    expected: self.prices.len(),
                    actual: bench.len(),
                });
            }
        }
        Ok(())
    }
}

/// Output of one simulator run: one [`DayState`] per input sample plus the
/// trade tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy: String,
    pub days: Vec<DayState>,
    pub trades: Vec<TradeEvent>,
}

impl SimulationResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.equity).collect()
    }

    pub fn final_equity(&self) -> f64 {
        self.days.last().map(|d| d.equity).unwrap_or(0.0)
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// A strategy that can be replayed over a price series.
pub trait Simulator: Send + Sync {
    /// Display name, unique within a run.
    fn name(&self) -> &str;

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError>;
}

/// Asset class used to pick V3 / tiered-exit defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// 3x index trackers such as TQQQ.
    LeveragedIndex,
    /// Everything else, including leveraged sector funds.
    Volatile,
}

/// Ticker fragments that mark a leveraged broad-index fund.
const LEVERAGED_INDEX_TICKERS: &[&str] = &["TQQQ", "UPRO", "SPXL", "QLD", "SSO"];

impl AssetClass {
    /// Classify by substring match on the upper-cased ticker.
    pub fn classify(ticker: &str) -> Self {
        let upper = ticker.to_ascii_uppercase();
        if LEVERAGED_INDEX_TICKERS.iter().any(|t| upper.contains(t)) {
            Self::LeveragedIndex
        } else {
            Self::Volatile
        }
    }

    /// Profit target in percent for the V3 and tiered-exit strategies.
    pub fn profit_target_pct(self) -> f64 {
        match self {
            Self::LeveragedIndex => 15.0,
            Self::Volatile => 20.0,
        }
    }
}

/// Serializable strategy selection with per-strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    BuyAndHold,
    StagedV1(StagedV1Params),
    StagedV2(StagedV2Params),
    StagedV3(StagedV3Params),
    TieredExit(TieredExitParams),
    ValueRebalance(ValueRebalanceParams),
    RiskRebalance(RiskRebalanceParams),
}

impl StrategyConfig {
    /// All seven strategies with default parameters.
    pub fn default_lineup() -> Vec<StrategyConfig> {
        vec![
            Self::BuyAndHold,
            Self::StagedV1(StagedV1Params::default()),
            Self::StagedV2(StagedV2Params::default()),
            Self::StagedV3(StagedV3Params::default()),
            Self::TieredExit(TieredExitParams::default()),
            Self::ValueRebalance(ValueRebalanceParams::default()),
            Self::RiskRebalance(RiskRebalanceParams::default()),
        ]
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BuyAndHold => "buy_and_hold",
            Self::StagedV1(_) => "staged_v1",
            Self::StagedV2(_) => "staged_v2",
            Self::StagedV3(_) => "staged_v3",
            Self::TieredExit(_) => "tiered_exit",
            Self::ValueRebalance(_) => "value_rebalance",
            Self::RiskRebalance(_) => "risk_rebalance",
        }
    }

    pub fn needs_benchmark(&self) -> bool {
        matches!(self, Self::RiskRebalance(_))
    }

    /// Build the simulator. `ticker` resolves asset-class defaults.
    pub fn build(&self, ticker: &str) -> Result<Box<dyn Simulator>, EngineError> {
        Ok(match self {
            Self::BuyAndHold => Box::new(BuyAndHold::new()),
            Self::StagedV1(p) => Box::new(StagedV1::new(p.clone())?),
            Self::StagedV2(p) => Box::new(StagedV2::new(p.clone())?),
            Self::StagedV3(p) => Box::new(StagedV3::new(p.clone(), ticker)?),
            Self::TieredExit(p) => Box::new(TieredExit::new(p.clone(), ticker)?),
            Self::ValueRebalance(p) => Box::new(ValueRebalance::new(p.clone())?),
            Self::RiskRebalance(p) => Box::new(RiskRebalance::new(p.clone())?),
        })
    }
}

/// Shared argument checks for the staged strategies.
pub(crate) fn check_splits(strategy: &str, splits: u32) -> Result<(), EngineError> {
    if splits == 0 {
        return Err(EngineError::param(strategy, "splits must be at least 1"));
    }
    Ok(())
}

pub(crate) fn check_positive(strategy: &str, field: &str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::param(
            strategy,
            format!("{field} must be positive, got {value}"),
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_substring() {
        assert_eq!(AssetClass::classify("TQQQ"), AssetClass::LeveragedIndex);
        assert_eq!(AssetClass::classify("tqqq"), AssetClass::LeveragedIndex);
        assert_eq!(AssetClass::classify("SOXL"), AssetClass::Volatile);
        assert_eq!(AssetClass::LeveragedIndex.profit_target_pct(), 15.0);
        assert_eq!(AssetClass::Volatile.profit_target_pct(), 20.0);
    }

    #[test]
    fn default_lineup_has_seven_distinct_kinds() {
        let lineup = StrategyConfig::default_lineup();
        assert_eq!(lineup.len(), 7);
        let kinds: std::collections::HashSet<&str> = lineup.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds.len(), 7);
        assert!(lineup.iter().all(|c| c.build("TQQQ").is_ok()));
    }

    #[test]
    fn strategy_config_deserializes_with_defaults() {
        let cfg: StrategyConfig = serde_json::from_str(r#"{"type":"staged_v1"}"#).unwrap();
        assert_eq!(cfg, StrategyConfig::StagedV1(StagedV1Params::default()));

        let cfg: StrategyConfig =
            serde_json::from_str(r#"{"type":"staged_v2","splits":20}"#).unwrap();
        match cfg {
            StrategyConfig::StagedV2(p) => assert_eq!(p.splits, 20),
            other => panic!("unexpected {other:?}"),
        }

        let cfg: StrategyConfig = serde_json::from_str(r#"{"type":"buy_and_hold"}"#).unwrap();
        assert_eq!(cfg, StrategyConfig::BuyAndHold);
    }

    #[test]
    fn only_risk_rebalance_needs_benchmark() {
        let needing: Vec<&str> = StrategyConfig::default_lineup()
            .iter()
            .filter(|c| c.needs_benchmark())
            .map(|c| c.kind())
            .collect();
        assert_eq!(needing, vec!["risk_rebalance"]);
    }

    #[test]
    fn mismatched_benchmark_is_rejected() {
        let prices = test_support::weekday_series(&[10.0, 11.0]);
        let bench = BenchmarkSeries::from_closes("QQQ", vec![1.0], 1);
        let input = SimulationInput::new(&prices, CapitalPlan::new(1000.0, 0.0, 1))
            .with_benchmark(&bench);
        assert_eq!(
            input.validate().unwrap_err(),
            EngineError::BenchmarkMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn zero_splits_rejected() {
        let cfg = StrategyConfig::StagedV1(StagedV1Params {
            splits: 0,
            ..StagedV1Params::default()
        });
        assert!(cfg.build("TQQQ").is_err());
    }
}
