//! Tiered partial exits.
//!
//! Buys one tranche whenever price is at or below the star line. Exits
//! depend on how deep into the cycle the position is:
//!
//! | progress `t` | full exit       | one unit (`shares / t`) |
//! |--------------|-----------------|-------------------------|
//! | `t < 1`      | at target price | never                   |
//! | `1..=9`      | at target price | at star price           |
//! | `t > 9`      | at target price | at or above average cost|

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeReason;
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{restart_cycle, Account, Book, Cycle};
use super::staged_v2::FLAT_ANCHOR_MARKUP;
use super::{check_positive, check_splits, AssetClass, SimulationInput, SimulationResult, Simulator};

const NAME: &str = "tiered_exit";

/// Last progress value of the intermediate regime.
const LATE_REGIME_START: f64 = 9.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredExitParams {
    pub splits: u32,
    pub profit_target_pct: Option<f64>,
    pub decay_factor: Option<f64>,
}

impl Default for TieredExitParams {
    fn default() -> Self {
        Self {
            splits: 40,
            profit_target_pct: None,
            decay_factor: None,
        }
    }
}

pub fn decay_factor(class: AssetClass) -> f64 {
    match class {
        AssetClass::LeveragedIndex => 3.0,
        AssetClass::Volatile => 4.0,
    }
}

/// Exit regime for progress `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Early,
    Intermediate,
    Late,
}

impl Regime {
    pub fn of(t: f64) -> Self {
        if t < 1.0 {
            Self::Early
        } else if t <= LATE_REGIME_START {
            Self::Intermediate
        } else {
            Self::Late
        }
    }
}

#[derive(Debug, Clone)]
pub struct TieredExit {
    splits: u32,
    target_pct: f64,
    factor: f64,
}

impl TieredExit {
    pub fn new(params: TieredExitParams, ticker: &str) -> Result<Self, EngineError> {
        check_splits(NAME, params.splits)?;
        let class = AssetClass::classify(ticker);
        let target_pct = params
            .profit_target_pct
            .unwrap_or_else(|| class.profit_target_pct());
        let factor = params.decay_factor.unwrap_or_else(|| decay_factor(class));
        check_positive(NAME, "profit_target_pct", target_pct)?;
        check_positive(NAME, "decay_factor", factor)?;
        Ok(Self {
            splits: params.splits,
            target_pct,
            factor,
        })
    }

    pub fn star_pct(&self, t: f64) -> f64 {
        self.target_pct - self.factor * t
    }

    /// Exit rules. Returns true when something was sold.
    fn exit_step(&self, book: &mut Book, cycle: &mut Cycle, date: NaiveDate, price: f64) -> bool {
        let holding = book.holding;
        if holding.is_flat() {
            return false;
        }
        let avg = holding.average_cost();
        let t = cycle.progress();
        let target_price = avg * (1.0 + self.target_pct / 100.0);

        if price >= target_price {
            restart_cycle(book, cycle, self.splits, date, price, TradeReason::ProfitTarget);
            debug!(%date, price, cash = book.cash, budget = cycle.budget, "tiered_exit full exit");
            return true;
        }

        let unit_trigger = match Regime::of(t) {
            Regime::Early => return false,
            Regime::Intermediate => avg * (1.0 + self.star_pct(t) / 100.0),
            Regime::Late => avg,
        };
        if price < unit_trigger {
            return false;
        }

        let before = holding.shares();
        let unit = before / t;
        match book.sell(Account::Cash, date, price, unit, TradeReason::UnitExit) {
            Some(sale) => {
                cycle.scale((before - sale.quantity) / before);
                true
            }
            None => false,
        }
    }
}

impl Simulator for TieredExit {
    fn name(&self) -> &str {
        NAME
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        input.validate()?;
        let plan = input.plan;
        let splits = self.splits;

        let mut book = Book::with_cash(plan.initial_capital);
        let mut cycle = Cycle::new(plan.initial_capital, splits);
        let mut schedule = DepositSchedule::for_run(&plan, input.prices.first().date);
        let mut days = Vec::with_capacity(input.prices.len());

        for point in input.prices.points() {
            let (date, price) = (point.date, point.price);
            if let Some(amount) = schedule.poll(date) {
                book.reserve += amount;
            }

            let holding = book.holding;
            if holding.is_dust(price) && (cycle.accumulated > 0.0 || !holding.is_flat()) {
                restart_cycle(&mut book, &mut cycle, splits, date, price, TradeReason::Sweep);
            }

            if !self.exit_step(&mut book, &mut cycle, date, price) {
                let avg = book.holding.average_cost();
                let buy_line = if avg > 0.0 {
                    avg * (1.0 + self.star_pct(cycle.progress()) / 100.0)
                } else {
                    price * FLAT_ANCHOR_MARKUP
                };
                if price <= buy_line {
                    if let Some(spent) =
                        book.buy(Account::Cash, date, price, cycle.budget, TradeReason::Tranche)
                    {
                        cycle.record_buy(spent);
                    }
                }
            }

            days.push(book.snapshot(date, price, Some(cycle.budget), None));
        }

        Ok(SimulationResult {
            strategy: NAME.to_string(),
            days,
            trades: book.trades,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CapitalPlan;
    use crate::strategy::test_support::{assert_non_negative, weekday_series};

    fn sim(splits: u32) -> TieredExit {
        TieredExit::new(
            TieredExitParams {
                splits,
                ..TieredExitParams::default()
            },
            "TQQQ",
        )
        .unwrap()
    }

    fn run(splits: u32, prices: &[f64]) -> SimulationResult {
        let series = weekday_series(prices);
        sim(splits)
            .simulate(&SimulationInput::new(&series, CapitalPlan::new(1000.0, 0.0, 1)))
            .unwrap()
    }

    #[test]
    fn regime_boundaries() {
        assert_eq!(Regime::of(0.0), Regime::Early);
        assert_eq!(Regime::of(0.99), Regime::Early);
        assert_eq!(Regime::of(1.0), Regime::Intermediate);
        assert_eq!(Regime::of(9.0), Regime::Intermediate);
        assert_eq!(Regime::of(9.01), Regime::Late);
    }

    #[test]
    fn asset_class_factors() {
        let other = TieredExit::new(TieredExitParams::default(), "SOXL").unwrap();
        assert_eq!(other.star_pct(1.0), 16.0);
        assert_eq!(sim(40).star_pct(1.0), 12.0);
    }

    #[test]
    fn full_exit_at_target_price() {
        // TQQQ target is 15%.
        let result = run(10, &[100.0, 116.0]);
        let day1 = &result.days[1];
        assert_eq!(day1.shares, 0.0);
        assert!((day1.cash - 1016.0).abs() < 1e-9);
        assert!((day1.tranche_budget.unwrap() - 101.6).abs() < 1e-9);
    }

    #[test]
    fn intermediate_regime_sells_one_unit_at_star() {
        // Two tranches at 100 -> t = 2, star = 15 - 6 = 9%.
        let result = run(10, &[100.0, 100.0, 109.5]);
        let exit = result.trades.last().unwrap();
        assert_eq!(exit.reason, TradeReason::UnitExit);
        assert!((exit.quantity - 1.0).abs() < 1e-12);
        assert!((result.days[2].shares - 1.0).abs() < 1e-12);
    }

    #[test]
    fn late_regime_sells_on_any_non_losing_day() {
        // A shallow decay keeps the star line above 100 for ten tranches.
        let tiered = TieredExit::new(
            TieredExitParams {
                splits: 20,
                decay_factor: Some(0.1),
                ..TieredExitParams::default()
            },
            "TQQQ",
        )
        .unwrap();
        let mut prices = vec![100.0; 10];
        prices.push(100.5);
        let series = weekday_series(&prices);
        let result = tiered
            .simulate(&SimulationInput::new(&series, CapitalPlan::new(1000.0, 0.0, 1)))
            .unwrap();

        assert_eq!(result.trade_count(), 11);
        let exit = result.trades.last().unwrap();
        assert_eq!(exit.reason, TradeReason::UnitExit);
        // Five shares over t = 10.
        assert!((exit.quantity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn early_regime_waits_for_the_full_target() {
        let tiered = sim(10);
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut book = Book::with_cash(1000.0);
        let mut cycle = Cycle::new(1000.0, 10);
        let spent = book
            .buy(Account::Cash, day, 100.0, 50.0, TradeReason::HalfTranche)
            .unwrap();
        cycle.record_buy(spent);
        assert_eq!(cycle.progress(), 0.5);

        // Above the star line but short of the 15% target.
        assert!(!tiered.exit_step(&mut book, &mut cycle, day, 112.0));
        assert_eq!(book.trades.len(), 1);

        assert!(tiered.exit_step(&mut book, &mut cycle, day, 116.0));
        assert!(book.holding.is_flat());
        assert_eq!(book.trades.last().unwrap().reason, TradeReason::ProfitTarget);
    }

    #[test]
    fn intermediate_buy_line_is_the_star_line() {
        // t = 1, star = 12%: 105 is under the line, so another tranche.
        let result = run(10, &[100.0, 105.0]);
        assert_eq!(result.trade_count(), 2);
        // t = 2, star = 9%: 108 is under 109.
        let result = run(10, &[100.0, 100.0, 108.0]);
        assert_eq!(result.trade_count(), 3);
        assert_non_negative(&result);
    }
}
