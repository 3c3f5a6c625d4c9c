//! Performance metrics — pure functions over an equity curve and the
//! contributed-principal curve.
//!
//! Returns are measured against principal (initial capital plus every
//! deposit so far), not against the first equity value, so monthly
//! contributions never count as gains.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use splitlab_core::SimulationResult;

/// Calendar days per year for annualization.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// One row of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub final_equity: f64,
    pub final_principal: f64,
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    /// Most negative drawdown, in percent (≤ 0).
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
}

impl StrategySummary {
    /// Summarize one simulator result. `principal` must be aligned with
    /// `result.days`.
    pub fn compute(result: &SimulationResult, principal: &[f64]) -> Self {
        let equity = result.equity_curve();
        let final_equity = equity.last().copied().unwrap_or(0.0);
        let final_principal = principal.last().copied().unwrap_or(0.0);
        let span = match (result.days.first(), result.days.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => (NaiveDate::MIN, NaiveDate::MIN),
        };
        Self {
            strategy: result.strategy.clone(),
            final_equity,
            final_principal,
            total_return_pct: total_return_pct(final_equity, final_principal),
            cagr_pct: cagr_pct(final_equity, final_principal, span.0, span.1),
            max_drawdown_pct: max_drawdown(&equity),
            trade_count: result.trade_count(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Highest value seen so far at each step.
pub fn running_max(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            peak
        })
        .collect()
}

/// Drawdown in percent from the running maximum: `(v / peak − 1) × 100`.
/// Zero while the peak is not positive.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(running_max(values))
        .map(|(&v, peak)| {
            if peak > 0.0 {
                (v / peak - 1.0) * 100.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Minimum of the drawdown series; 0.0 for an empty curve.
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown_series(values).into_iter().fold(0.0, f64::min)
}

/// `(final / principal − 1) × 100`, 0.0 when principal is not positive.
pub fn total_return_pct(final_equity: f64, principal: f64) -> f64 {
    if principal <= 0.0 {
        return 0.0;
    }
    (final_equity / principal - 1.0) * 100.0
}

/// Annualized return over the calendar span `[start, end]`.
///
/// Returns 0.0 for an empty span, non-positive principal, or non-positive
/// final equity.
pub fn cagr_pct(final_equity: f64, principal: f64, start: NaiveDate, end: NaiveDate) -> f64 {
    let years = (end - start).num_days() as f64 / DAYS_PER_YEAR;
    if years <= 0.0 || principal <= 0.0 || final_equity <= 0.0 {
        return 0.0;
    }
    ((final_equity / principal).powf(1.0 / years) - 1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitlab_core::domain::DayState;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-2
    }

    #[test]
    fn drawdown_example() {
        let values = [100.0, 120.0, 90.0, 110.0];
        assert_eq!(running_max(&values), vec![100.0, 120.0, 120.0, 120.0]);

        let dd = drawdown_series(&values);
        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert!(approx(dd[2], -25.0));
        assert!(approx(dd[3], -8.33));
        assert!(approx(max_drawdown(&values), -25.0));
    }

    #[test]
    fn monotone_curve_has_no_drawdown() {
        let values: Vec<f64> = (1..50).map(f64::from).collect();
        assert!(drawdown_series(&values).iter().all(|&d| d == 0.0));
        assert_eq!(max_drawdown(&values), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn total_return_against_principal() {
        assert!(approx(total_return_pct(15_000.0, 10_000.0), 50.0));
        assert_eq!(total_return_pct(1.0, 0.0), 0.0);
    }

    #[test]
    fn cagr_uses_calendar_years() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        // 2020-01-01 .. 2022-01-01 is 731 days, just over two years.
        let end = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let c = cagr_pct(12_100.0, 10_000.0, start, end);
        assert!((c - 10.0).abs() < 0.05, "{c}");
        assert_eq!(cagr_pct(12_100.0, 10_000.0, start, start), 0.0);
        assert_eq!(cagr_pct(0.0, 10_000.0, start, end), 0.0);
    }

    #[test]
    fn summary_from_result() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let day = |i: i64, equity: f64| DayState {
            date: start + chrono::Duration::days(i),
            price: 1.0,
            cash: equity,
            reserve: 0.0,
            shares: 0.0,
            average_cost: 0.0,
            equity,
            tranche_budget: None,
            target_value: None,
        };
        let result = SimulationResult {
            strategy: "buy_and_hold".into(),
            days: vec![day(0, 100.0), day(1, 120.0), day(2, 90.0), day(3, 110.0)],
            trades: vec![],
        };
        let summary = StrategySummary::compute(&result, &[100.0, 100.0, 100.0, 100.0]);
        assert_eq!(summary.strategy, "buy_and_hold");
        assert_eq!(summary.final_equity, 110.0);
        assert_eq!(summary.final_principal, 100.0);
        assert!(approx(summary.total_return_pct, 10.0));
        assert!(approx(summary.max_drawdown_pct, -25.0));
        assert!(summary.cagr_pct > 0.0);
        assert_eq!(summary.trade_count, 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn drawdowns_are_bounded(values in prop::collection::vec(1.0..1000.0_f64, 1..200)) {
            let dd = drawdown_series(&values);
            prop_assert_eq!(dd.len(), values.len());
            prop_assert_eq!(dd[0], 0.0);
            for d in &dd {
                prop_assert!(*d <= 0.0 && *d > -100.0);
            }
            prop_assert!(max_drawdown(&values) <= 0.0);
        }

        #[test]
        fn running_max_never_decreases(values in prop::collection::vec(-50.0..50.0_f64, 1..200)) {
            let peaks = running_max(&values);
            for w in peaks.windows(2) {
                prop_assert!(w[1] >= w[0]);
            }
            for (v, p) in values.iter().zip(&peaks) {
                prop_assert!(p >= v);
            }
        }
    }
}
