//! Value rebalancing.
//!
//! Half of the initial capital buys shares, the other half becomes the
//! pool. A target position value grows every trading day at a fixed
//! annualized rate (plus a pool-size term when `pool_aware`). Whenever the
//! position value leaves the band around the target, the difference is
//! bought from or sold into the pool.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{PricePoint, Side, TradeReason};
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{Account, Book};
use super::{SimulationInput, SimulationResult, Simulator};

const NAME: &str = "value_rebalance";

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRebalanceParams {
    /// Annualized target growth in percent.
    pub growth_rate_pct: f64,
    /// Half-width of the band around the target, as a fraction.
    pub band: f64,
    /// Largest share of the pool a single buy may use.
    pub max_pool_usage: f64,
    pub pool_aware: bool,
}

impl Default for ValueRebalanceParams {
    fn default() -> Self {
        Self {
            growth_rate_pct: 10.0,
            band: 0.10,
            max_pool_usage: 0.75,
            pool_aware: true,
        }
    }
}

/// Daily compounding factor for an annual growth rate in percent.
pub fn daily_growth(annual_pct: f64) -> f64 {
    (1.0 + annual_pct / 100.0).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0
}

/// Growth engine for the target value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TargetPath {
    growth_rate_pct: f64,
    daily: f64,
    pool_aware: bool,
}

impl TargetPath {
    pub(crate) fn new(growth_rate_pct: f64, pool_aware: bool) -> Self {
        Self {
            growth_rate_pct,
            daily: daily_growth(growth_rate_pct),
            pool_aware,
        }
    }

    /// One trading day of growth.
    pub(crate) fn advance(&self, target: f64, pool: f64) -> f64 {
        let mut next = target * (1.0 + self.daily);
        if self.pool_aware && self.growth_rate_pct > 0.0 {
            next += pool / self.growth_rate_pct / TRADING_DAYS_PER_YEAR;
        }
        next
    }
}

/// Per-day band and buy throttle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Overlay {
    pub band: f64,
    pub buy_intensity: f64,
}

/// Bring the position back inside `target * (1 ± band)`.
///
/// Buys use at most `max_pool_usage` of the pool, scaled by `intensity`.
/// Sells move the whole excess into the pool.
pub(crate) fn rebalance_step(
    book: &mut Book,
    date: NaiveDate,
    price: f64,
    target: f64,
    overlay: Overlay,
    max_pool_usage: f64,
) -> Option<Side> {
    let value = book.holding.market_value(price);
    if value < target * (1.0 - overlay.band) {
        let amount = (target - value).min(book.reserve * max_pool_usage) * overlay.buy_intensity;
        book.buy(Account::Reserve, date, price, amount, TradeReason::Rebalance)
            .map(|_| Side::Buy)
    } else if value > target * (1.0 + overlay.band) {
        let quantity = ((value - target) / price).min(book.holding.shares());
        book.sell(Account::Reserve, date, price, quantity, TradeReason::Rebalance)
            .map(|_| Side::Sell)
    } else {
        None
    }
}

pub(crate) fn validate_rebalance(
    strategy: &str,
    growth_rate_pct: f64,
    band: f64,
    max_pool_usage: f64,
) -> Result<(), EngineError> {
    if !growth_rate_pct.is_finite() || growth_rate_pct < 0.0 {
        return Err(EngineError::param(strategy, "growth_rate_pct must be >= 0"));
    }
    if !(band > 0.0 && band < 1.0) {
        return Err(EngineError::param(strategy, "band must be in (0, 1)"));
    }
    if !(max_pool_usage > 0.0 && max_pool_usage <= 1.0) {
        return Err(EngineError::param(strategy, "max_pool_usage must be in (0, 1]"));
    }
    Ok(())
}

/// Shared daily loop of both rebalancers. `overlay` is asked for the band
/// and buy throttle of each day.
pub(crate) fn simulate_rebalance<F>(
    name: &str,
    input: &SimulationInput<'_>,
    path: TargetPath,
    max_pool_usage: f64,
    mut overlay: F,
) -> Result<SimulationResult, EngineError>
where
    F: FnMut(usize, &PricePoint) -> Overlay,
{
    input.validate()?;
    let plan = input.plan;
    let first = input.prices.first();

    let mut book = Book::with_reserve(plan.initial_capital);
    book.buy(
        Account::Reserve,
        first.date,
        first.price,
        plan.initial_capital / 2.0,
        TradeReason::Initial,
    );
    let mut target = book.holding.market_value(first.price);
    let mut schedule = DepositSchedule::for_run(&plan, first.date);
    let mut days = Vec::with_capacity(input.prices.len());

    for (i, point) in input.prices.points().iter().enumerate() {
        if i > 0 {
            target = path.advance(target, book.reserve);
            if let Some(amount) = schedule.poll(point.date) {
                book.reserve += amount;
                target += amount;
            }
        }
        let today = overlay(i, point);
        rebalance_step(&mut book, point.date, point.price, target, today, max_pool_usage);
        days.push(book.snapshot(point.date, point.price, None, Some(target)));
    }

    Ok(SimulationResult {
        strategy: name.to_string(),
        days,
        trades: book.trades,
    })
}

#[derive(Debug, Clone)]
pub struct ValueRebalance {
    params: ValueRebalanceParams,
}

impl ValueRebalance {
    pub fn new(params: ValueRebalanceParams) -> Result<Self, EngineError> {
        validate_rebalance(NAME, params.growth_rate_pct, params.band, params.max_pool_usage)?;
        Ok(Self { params })
    }
}

impl Simulator for ValueRebalance {
    fn name(&self) -> &str {
        NAME
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        let p = &self.params;
        let fixed = Overlay {
            band: p.band,
            buy_intensity: 1.0,
        };
        simulate_rebalance(
            NAME,
            input,
            TargetPath::new(p.growth_rate_pct, p.pool_aware),
            p.max_pool_usage,
            |_, _| fixed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CapitalPlan;
    use crate::strategy::test_support::{assert_non_negative, weekday_series};

    fn run(prices: &[f64], plan: CapitalPlan, params: ValueRebalanceParams) -> SimulationResult {
        let series = weekday_series(prices);
        ValueRebalance::new(params)
            .unwrap()
            .simulate(&SimulationInput::new(&series, plan))
            .unwrap()
    }

    #[test]
    fn daily_growth_compounds_to_annual_rate() {
        let g = daily_growth(10.0);
        assert!(((1.0 + g).powf(252.0) - 1.10).abs() < 1e-9);
        assert_eq!(daily_growth(0.0), 0.0);
    }

    #[test]
    fn starts_half_invested_with_target_at_position_value() {
        let result = run(&[50.0], CapitalPlan::new(1000.0, 0.0, 1), ValueRebalanceParams::default());
        let day0 = &result.days[0];
        assert_eq!(day0.shares, 10.0);
        assert_eq!(day0.reserve, 500.0);
        assert_eq!(day0.target_value, Some(500.0));
    }

    #[test]
    fn target_grows_from_day_one() {
        let params = ValueRebalanceParams {
            pool_aware: false,
            ..ValueRebalanceParams::default()
        };
        let result = run(&[100.0, 100.0], CapitalPlan::new(1000.0, 0.0, 1), params);
        let t0 = result.days[0].target_value.unwrap();
        let t1 = result.days[1].target_value.unwrap();
        assert!((t1 - t0 * (1.0 + daily_growth(10.0))).abs() < 1e-9);
    }

    #[test]
    fn pool_aware_growth_adds_pool_term() {
        let result = run(&[100.0, 100.0], CapitalPlan::new(1000.0, 0.0, 1), ValueRebalanceParams::default());
        let t1 = result.days[1].target_value.unwrap();
        let expected = 500.0 * (1.0 + daily_growth(10.0)) + 500.0 / 10.0 / 252.0;
        assert!((t1 - expected).abs() < 1e-9);
    }

    #[test]
    fn flat_price_eventually_triggers_a_buy() {
        let result = run(&[100.0; 400], CapitalPlan::new(10_000.0, 0.0, 1), ValueRebalanceParams::default());
        let buy = result
            .trades
            .iter()
            .find(|t| t.reason == TradeReason::Rebalance && t.side == Side::Buy)
            .expect("target growth should force a buy");
        // Never more than 75% of the pool.
        let before = result
            .days
            .iter()
            .take_while(|d| d.date < buy.date)
            .last()
            .unwrap();
        assert!(buy.amount <= before.reserve * 0.75 + 1e-9);
        // Trades at a constant price never change equity.
        assert!((result.final_equity() - 10_000.0).abs() < 1e-6);
        assert_non_negative(&result);
    }

    #[test]
    fn spike_sells_excess_into_pool() {
        let result = run(&[100.0, 130.0], CapitalPlan::new(1000.0, 0.0, 1), ValueRebalanceParams::default());
        let day1 = &result.days[1];
        let position = day1.shares * day1.price;
        assert!((position - day1.target_value.unwrap()).abs() < 1e-9);
        assert_eq!(result.trades.last().unwrap().side, Side::Sell);
    }

    #[test]
    fn deposits_feed_pool_and_target() {
        let plan = CapitalPlan::new(1000.0, 100.0, 1);
        let result = run(&[100.0; 30], plan, ValueRebalanceParams {
            pool_aware: false,
            ..ValueRebalanceParams::default()
        });
        // 2024-02-01 is the 23rd weekday from 2024-01-02.
        let (before, on) = (&result.days[21], &result.days[22]);
        assert_eq!(on.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let grown = before.target_value.unwrap() * (1.0 + daily_growth(10.0));
        assert!((on.target_value.unwrap() - grown - 100.0).abs() < 1e-9);
        assert!((result.final_equity() - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_band() {
        assert!(ValueRebalance::new(ValueRebalanceParams {
            band: 0.0,
            ..ValueRebalanceParams::default()
        })
        .is_err());
        assert!(ValueRebalance::new(ValueRebalanceParams {
            max_pool_usage: 1.5,
            ..ValueRebalanceParams::default()
        })
        .is_err());
    }
}
