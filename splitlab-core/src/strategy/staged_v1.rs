//! Staged accumulation, first generation.
//!
//! Capital is cut into `splits` equal tranches and one tranche is bought per
//! day while cash lasts. Deposits wait on the side. Once the position gains
//! `profit_target_pct` over its average cost, everything is sold, waiting
//! cash is merged back, and the tranche budget is resized from the new cash.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeReason;
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{restart_cycle, Account, Book, Cycle};
use super::{check_positive, check_splits, SimulationInput, SimulationResult, Simulator};

const NAME: &str = "staged_v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedV1Params {
    pub splits: u32,
    pub profit_target_pct: f64,
}

impl Default for StagedV1Params {
    fn default() -> Self {
        Self {
            splits: 40,
            profit_target_pct: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedV1 {
    params: StagedV1Params,
}

impl StagedV1 {
    pub fn new(params: StagedV1Params) -> Result<Self, EngineError> {
        check_splits(NAME, params.splits)?;
        check_positive(NAME, "profit_target_pct", params.profit_target_pct)?;
        Ok(Self { params })
    }
}

impl Simulator for StagedV1 {
    fn name(&self) -> &str {
        NAME
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        input.validate()?;
        let plan = input.plan;
        let splits = self.params.splits;

        let mut book = Book::with_cash(plan.initial_capital);
        let mut cycle = Cycle::new(plan.initial_capital, splits);
        let mut schedule = DepositSchedule::for_run(&plan, input.prices.first().date);
        let mut days = Vec::with_capacity(input.prices.len());

        for point in input.prices.points() {
            let (date, price) = (point.date, point.price);
            if let Some(amount) = schedule.poll(date) {
                book.reserve += amount;
            }

            let take_profit =
                !book.holding.is_flat() && book.holding.gain_pct(price) >= self.params.profit_target_pct;
            if take_profit {
                restart_cycle(&mut book, &mut cycle, splits, date, price, TradeReason::ProfitTarget);
                debug!(%date, price, cash = book.cash, budget = cycle.budget, "staged_v1 cycle reset");
            } else if let Some(spent) =
                book.buy(Account::Cash, date, price, cycle.budget, TradeReason::Tranche)
            {
                cycle.record_buy(spent);
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
    use crate::domain::Side;
    use crate::schedule::CapitalPlan;
    use crate::strategy::test_support::{assert_non_negative, weekday_series};

    fn run(prices: &[f64], plan: CapitalPlan, params: StagedV1Params) -> SimulationResult {
        let series = weekday_series(prices);
        StagedV1::new(params)
            .unwrap()
            .simulate(&SimulationInput::new(&series, plan))
            .unwrap()
    }

    #[test]
    fn buys_one_tranche_per_day_until_cash_runs_out() {
        let result = run(
            &[100.0; 6],
            CapitalPlan::new(1000.0, 0.0, 1),
            StagedV1Params {
                splits: 4,
                ..StagedV1Params::default()
            },
        );
        assert_eq!(result.trade_count(), 4);
        assert_eq!(result.days[3].cash, 0.0);
        assert_eq!(result.days[5].shares, 10.0);
        assert_non_negative(&result);
    }

    #[test]
    fn profit_target_resets_cycle_with_larger_budget() {
        let result = run(
            &[100.0, 100.0, 111.0, 111.0],
            CapitalPlan::new(1000.0, 0.0, 1),
            StagedV1Params {
                splits: 2,
                profit_target_pct: 10.0,
            },
        );
        let reset_day = &result.days[2];
        assert_eq!(reset_day.shares, 0.0);
        assert_eq!(reset_day.average_cost, 0.0);
        assert!((reset_day.cash - 1110.0).abs() < 1e-9);
        assert!((reset_day.tranche_budget.unwrap() - 555.0).abs() < 1e-9);

        let sell = &result.trades[2];
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.reason, TradeReason::ProfitTarget);

        // A fresh cycle opens the next day with the resized tranche.
        assert!((result.trades[3].amount - 555.0).abs() < 1e-9);
    }

    #[test]
    fn deposits_wait_until_reset() {
        // 2024-01-02 start; the first deposit lands on 2024-02-01.
        let mut prices = vec![100.0; 30];
        prices.push(120.0);
        let result = run(
            &prices,
            CapitalPlan::new(1000.0, 500.0, 1),
            StagedV1Params {
                splits: 40,
                ..StagedV1Params::default()
            },
        );
        let before = &result.days[29];
        assert_eq!(before.reserve, 500.0);

        let after = &result.days[30];
        assert_eq!(after.reserve, 0.0);
        assert_eq!(after.shares, 0.0);
        assert!((after.tranche_budget.unwrap() - after.cash / 40.0).abs() < 1e-9);
        assert_non_negative(&result);
    }

    #[test]
    fn rejects_zero_splits() {
        assert!(StagedV1::new(StagedV1Params {
            splits: 0,
            ..StagedV1Params::default()
        })
        .is_err());
    }
}
