//! Value rebalancing with benchmark-driven risk overlays.
//!
//! The band tightens and buying is throttled as the benchmark falls away
//! from its high-water mark or below its moving average. During a
//! correction or crash, buying only resumes when market sentiment shows
//! enough fear. Sells are never throttled.

use serde::{Deserialize, Serialize};

use crate::domain::BenchmarkSeries;
use crate::error::EngineError;
use crate::sentiment::SentimentSource;

use super::value_rebalance::{simulate_rebalance, validate_rebalance, Overlay, TargetPath};
use super::{SimulationInput, SimulationResult, Simulator};

const NAME: &str = "risk_rebalance";

/// Drawdown (percent) at or below which the market is in a correction.
pub const CORRECTION_DRAWDOWN_PCT: f64 = -10.0;
/// Drawdown (percent) at or below which the market is in a crash.
pub const CRASH_DRAWDOWN_PCT: f64 = -20.0;

const DEFENSIVE_BAND: f64 = 0.05;
const CORRECTION_BAND: f64 = 0.07;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRebalanceParams {
    pub growth_rate_pct: f64,
    /// Band used in calm markets.
    pub base_band: f64,
    pub max_pool_usage: f64,
    pub pool_aware: bool,
    pub sentiment: SentimentSource,
}

impl Default for RiskRebalanceParams {
    fn default() -> Self {
        Self {
            growth_rate_pct: 10.0,
            base_band: 0.10,
            max_pool_usage: 0.75,
            pool_aware: true,
            sentiment: SentimentSource::default(),
        }
    }
}

/// Band for the day given the benchmark drawdown and its position against
/// the moving average.
pub fn risk_band(drawdown_pct: f64, below_average: bool, base_band: f64) -> f64 {
    if below_average || drawdown_pct <= CRASH_DRAWDOWN_PCT {
        DEFENSIVE_BAND
    } else if drawdown_pct <= CORRECTION_DRAWDOWN_PCT {
        CORRECTION_BAND
    } else {
        base_band
    }
}

/// Fraction of a rebalancing buy that is allowed through.
pub fn buy_intensity(drawdown_pct: f64, sentiment: f64) -> f64 {
    if drawdown_pct > CORRECTION_DRAWDOWN_PCT {
        1.0
    } else if drawdown_pct > CRASH_DRAWDOWN_PCT {
        if sentiment <= 20.0 {
            0.5
        } else {
            0.0
        }
    } else if sentiment <= 15.0 {
        0.3
    } else {
        0.0
    }
}

/// Running benchmark high-water mark.
#[derive(Debug, Clone, Copy, Default)]
struct HighWater {
    peak: f64,
}

impl HighWater {
    /// Update with today's close and return the drawdown in percent.
    fn drawdown_pct(&mut self, close: f64) -> f64 {
        self.peak = self.peak.max(close);
        if self.peak > 0.0 {
            (close / self.peak - 1.0) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskRebalance {
    params: RiskRebalanceParams,
}

impl RiskRebalance {
    pub fn new(params: RiskRebalanceParams) -> Result<Self, EngineError> {
        validate_rebalance(NAME, params.growth_rate_pct, params.base_band, params.max_pool_usage)?;
        Ok(Self { params })
    }

    fn overlay(
        &self,
        bench: &BenchmarkSeries,
        hwm: &mut HighWater,
        i: usize,
        date: chrono::NaiveDate,
    ) -> Overlay {
        let drawdown = hwm.drawdown_pct(bench.closes[i]);
        Overlay {
            band: risk_band(drawdown, bench.below_average(i), self.params.base_band),
            buy_intensity: buy_intensity(drawdown, self.params.sentiment.value_on(date)),
        }
    }
}

impl Simulator for RiskRebalance {
    fn name(&self) -> &str {
        NAME
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        let bench = input.benchmark.ok_or_else(|| EngineError::MissingBenchmark {
            strategy: NAME.to_string(),
        })?;
        let p = &self.params;
        let mut hwm = HighWater::default();
        simulate_rebalance(
            NAME,
            input,
            TargetPath::new(p.growth_rate_pct, p.pool_aware),
            p.max_pool_usage,
            |i, point| self.overlay(bench, &mut hwm, i, point.date),
        )
    }
}
