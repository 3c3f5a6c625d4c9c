//! Staged accumulation, third generation.
//!
//! Adds asset-class-aware targets and a sliding star line
//! (`star_pct = target - factor * t`) to the V2 buy rules, plus three ways
//! of taking money off the table:
//!
//! * cyclic liquidation once every tranche is deployed: 25% of the shares
//!   per day for up to five days;
//! * graduation at the profit target: 75% of the shares, with half the
//!   realized profit rolled into the tranche budget;
//! * a quarter exit whenever price reaches the star line.
//!
//! Graduation and quarter-exit days never buy. Liquidation-window days may
//! buy, but both tranche halves are gated by the pinned star line
//! (`average_cost * (1 + liquidation_star_pct / 100)`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeReason;
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{restart_cycle, Account, Book, Cycle};
use super::staged_v2::{anchor_price, two_phase_buy};
use super::{check_positive, check_splits, AssetClass, SimulationInput, SimulationResult, Simulator};

const NAME: &str = "staged_v3";

const QUARTER: f64 = 0.25;
const GRADUATION_FRACTION: f64 = 0.75;
const PROFIT_RECYCLE_SHARE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedV3Params {
    pub splits: u32,
    /// Overrides the asset-class profit target.
    pub profit_target_pct: Option<f64>,
    /// Overrides the asset-class star decay factor.
    pub star_factor: Option<f64>,
    /// Star line used while a cyclic liquidation window is open.
    pub liquidation_star_pct: f64,
    pub liquidation_days: u32,
}

impl Default for StagedV3Params {
    fn default() -> Self {
        Self {
            splits: 40,
            profit_target_pct: None,
            star_factor: None,
            liquidation_star_pct: -10.0,
            liquidation_days: 5,
        }
    }
}

/// V3 star decay per tranche deployed.
pub fn star_factor(class: AssetClass) -> f64 {
    match class {
        AssetClass::LeveragedIndex => 1.5,
        AssetClass::Volatile => 2.0,
    }
}

#[derive(Debug, Clone)]
pub struct StagedV3 {
    splits: u32,
    target_pct: f64,
    factor: f64,
    liquidation_star_pct: f64,
    liquidation_days: u32,
}

impl StagedV3 {
    /// Resolves asset-class defaults from `ticker`.
    pub fn new(params: StagedV3Params, ticker: &str) -> Result<Self, EngineError> {
        check_splits(NAME, params.splits)?;
        if params.liquidation_days == 0 {
            return Err(EngineError::param(NAME, "liquidation_days must be at least 1"));
        }
        let class = AssetClass::classify(ticker);
        let target_pct = params
            .profit_target_pct
            .unwrap_or_else(|| class.profit_target_pct());
        let factor = params.star_factor.unwrap_or_else(|| star_factor(class));
        check_positive(NAME, "profit_target_pct", target_pct)?;
        check_positive(NAME, "star_factor", factor)?;
        Ok(Self {
            splits: params.splits,
            target_pct,
            factor,
            liquidation_star_pct: params.liquidation_star_pct,
            liquidation_days: params.liquidation_days,
        })
    }

    pub fn target_pct(&self) -> f64 {
        self.target_pct
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Star offset in percent for progress `t`.
    pub fn star_pct(&self, t: f64, liquidating: bool) -> f64 {
        if liquidating {
            self.liquidation_star_pct
        } else {
            self.target_pct - self.factor * t
        }
    }
}

/// Mutable state of one V3 run.
struct State {
    book: Book,
    cycle: Cycle,
    /// Days already spent in the open liquidation window; 0 when closed.
    liquidation_day: u32,
}

impl StagedV3 {
    /// Sell rules for one day. Returns the reason of the last sale, if any.
    ///
    /// Inside a liquidation window the cyclic quarter sale replaces the
    /// star-line exit; graduation is checked either way.
    fn sell_step(
        &self,
        state: &mut State,
        date: chrono::NaiveDate,
        price: f64,
        liquidating: bool,
    ) -> Option<TradeReason> {
        if state.book.holding.is_flat() {
            return None;
        }
        let mut last = None;

        if liquidating {
            if state
                .book
                .sell_fraction(Account::Cash, date, price, QUARTER, TradeReason::CyclicLiquidation)
                .is_some()
            {
                state.cycle.scale(1.0 - QUARTER);
                last = Some(TradeReason::CyclicLiquidation);
            }
            state.liquidation_day += 1;
            if state.liquidation_day >= self.liquidation_days {
                state.liquidation_day = 0;
            }
        }

        let holding = state.book.holding;
        if holding.gain_pct(price) >= self.target_pct {
            if let Some(sale) = state.book.sell_fraction(
                Account::Cash,
                date,
                price,
                GRADUATION_FRACTION,
                TradeReason::Graduation,
            ) {
                state.cycle.scale(1.0 - GRADUATION_FRACTION);
                let profit = sale.realized_profit();
                if profit > 0.0 {
                    state.cycle.budget += profit * PROFIT_RECYCLE_SHARE / f64::from(self.splits);
                }
                debug!(%date, price, profit, budget = state.cycle.budget, "staged_v3 graduation");
                return Some(TradeReason::Graduation);
            }
        }
        if liquidating {
            return last;
        }

        let t = state.cycle.progress();
        let star_price = holding.average_cost() * (1.0 + self.star_pct(t, false) / 100.0);
        if price >= star_price
            && state
                .book
                .sell_fraction(Account::Cash, date, price, QUARTER, TradeReason::QuarterExit)
                .is_some()
        {
            state.cycle.scale(1.0 - QUARTER);
            return Some(TradeReason::QuarterExit);
        }
        None
    }
}

impl Simulator for StagedV3 {
    fn name(&self) -> &str {
        NAME
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        input.validate()?;
        let plan = input.plan;
        let splits = self.splits;

        let mut state = State {
            book: Book::with_cash(plan.initial_capital),
            cycle: Cycle::new(plan.initial_capital, splits),
            liquidation_day: 0,
        };
        let mut schedule = DepositSchedule::for_run(&plan, input.prices.first().date);
        let mut days = Vec::with_capacity(input.prices.len());

        for point in input.prices.points() {
            let (date, price) = (point.date, point.price);
            if let Some(amount) = schedule.poll(date) {
                state.book.reserve += amount;
            }

            let holding = state.book.holding;
            if holding.is_dust(price) && (state.cycle.accumulated > 0.0 || !holding.is_flat()) {
                restart_cycle(
                    &mut state.book,
                    &mut state.cycle,
                    splits,
                    date,
                    price,
                    TradeReason::Sweep,
                );
                state.liquidation_day = 0;
                debug!(%date, cash = state.book.cash, budget = state.cycle.budget, "staged_v3 cycle reset");
            }

            let liquidating = !state.book.holding.is_flat()
                && (state.liquidation_day > 0 || state.cycle.progress() >= f64::from(splits));
            let sold = self.sell_step(&mut state, date, price, liquidating);

            // Window days keep buying, but only under the pinned star line.
            if matches!(sold, None | Some(TradeReason::CyclicLiquidation)) {
                let t = state.cycle.progress();
                let anchor = anchor_price(state.book.holding.average_cost(), price);
                let limit = anchor * (1.0 + self.star_pct(t, liquidating) / 100.0);
                let anchor = if liquidating { limit } else { anchor };
                two_phase_buy(
                    &mut state.book,
                    &mut state.cycle,
                    splits,
                    date,
                    price,
                    anchor,
                    limit,
                );
            }

            days.push(state.book.snapshot(date, price, Some(state.cycle.budget), None));
        }

        Ok(SimulationResult {
            strategy: NAME.to_string(),
            days,
            trades: state.book.trades,
        })
    }
}
