//! Staged accumulation, second generation.
//!
//! Buying is gated on price. While less than half of the tranches are
//! deployed, each day can buy up to two half tranches: one when the price
//! is at or below the average cost and one when it is at or below the
//! limit line. After that only a full tranche at or below the limit line.
//! The limit line starts 10% above the average cost and slides down by half
//! a percent per tranche deployed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeReason;
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{restart_cycle, Account, Book, Cycle};
use super::{check_positive, check_splits, SimulationInput, SimulationResult, Simulator};

const NAME: &str = "staged_v2";

/// Anchor multiplier used while flat so the first tranche always fills.
pub(crate) const FLAT_ANCHOR_MARKUP: f64 = 1.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedV2Params {
    pub splits: u32,
    pub profit_target_pct: f64,
}

impl Default for StagedV2Params {
    fn default() -> Self {
        Self {
            splits: 40,
            profit_target_pct: 10.0,
        }
    }
}

/// Limit-order line for progress `t` around `anchor`.
pub fn loc_price(anchor: f64, t: f64) -> f64 {
    anchor * (1.0 + (10.0 - t / 2.0) / 100.0)
}

/// Average cost, or a marked-up current price when nothing is held.
pub(crate) fn anchor_price(average_cost: f64, price: f64) -> f64 {
    if average_cost > 0.0 {
        average_cost
    } else {
        price * FLAT_ANCHOR_MARKUP
    }
}

/// Two-phase tranche buying shared by the price-gated staged strategies.
///
/// Returns the total amount spent.
pub(crate) fn two_phase_buy(
    book: &mut Book,
    cycle: &mut Cycle,
    splits: u32,
    date: chrono::NaiveDate,
    price: f64,
    anchor: f64,
    limit: f64,
) -> f64 {
    let t = cycle.progress();
    let mut spent = 0.0;
    if t < f64::from(splits) / 2.0 {
        let half = cycle.budget / 2.0;
        if price <= anchor {
            spent += book
                .buy(Account::Cash, date, price, half, TradeReason::HalfTranche)
                .unwrap_or(0.0);
        }
        if price <= limit {
            spent += book
                .buy(Account::Cash, date, price, half, TradeReason::HalfTranche)
                .unwrap_or(0.0);
        }
    } else if price <= limit {
        spent += book
            .buy(Account::Cash, date, price, cycle.budget, TradeReason::Tranche)
            .unwrap_or(0.0);
    }
    cycle.record_buy(spent);
    spent
}

#[derive(Debug, Clone)]
pub struct StagedV2 {
    params: StagedV2Params,
}

impl StagedV2 {
    pub fn new(params: StagedV2Params) -> Result<Self, EngineError> {
        check_splits(NAME, params.splits)?;
        check_positive(NAME, "profit_target_pct", params.profit_target_pct)?;
        Ok(Self { params })
    }
}

impl Simulator for StagedV2 {
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
                debug!(%date, price, cash = book.cash, budget = cycle.budget, "staged_v2 cycle reset");
            } else {
                let anchor = anchor_price(book.holding.average_cost(), price);
                let limit = loc_price(anchor, cycle.progress());
                two_phase_buy(&mut book, &mut cycle, splits, date, price, anchor, limit);
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
