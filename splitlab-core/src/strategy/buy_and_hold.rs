//! Baseline: invest everything on day 0, buy with every deposit, never sell.

use crate::domain::TradeReason;
use crate::error::EngineError;
use crate::schedule::DepositSchedule;

use super::book::{Account, Book};
use super::{SimulationInput, SimulationResult, Simulator};

#[derive(Debug, Clone, Default)]
pub struct BuyAndHold;

impl BuyAndHold {
    pub fn new() -> Self {
        Self
    }
}

impl Simulator for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, EngineError> {
        input.validate()?;
        let plan = input.plan;
        let first = input.prices.first();

        let mut book = Book::with_cash(plan.initial_capital);
        let mut schedule = DepositSchedule::for_run(&plan, first.date);
        let mut days = Vec::with_capacity(input.prices.len());

        for (i, point) in input.prices.points().iter().enumerate() {
            if i == 0 {
                book.buy(
                    Account::Cash,
                    point.date,
                    point.price,
                    plan.initial_capital,
                    TradeReason::Initial,
                );
            } else if let Some(amount) = schedule.poll(point.date) {
                book.cash += amount;
                book.buy(
                    Account::Cash,
                    point.date,
                    point.price,
                    amount,
                    TradeReason::Contribution,
                );
            }
            days.push(book.snapshot(point.date, point.price, None, None));
        }

        Ok(SimulationResult {
            strategy: self.name().to_string(),
            days,
            trades: book.trades,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CapitalPlan;
    use crate::strategy::test_support::weekday_series;

    #[test]
    fn linear_rise_without_deposits() {
        let prices: Vec<f64> = (0..252).map(|i| 100.0 + 50.0 * f64::from(i) / 251.0).collect();
        let series = weekday_series(&prices);
        let input = SimulationInput::new(&series, CapitalPlan::new(10_000.0, 0.0, 1));
        let result = BuyAndHold::new().simulate(&input).unwrap();

        assert_eq!(result.days.len(), prices.len());
        assert_eq!(result.final_equity(), 15_000.0);
        assert_eq!(result.days[0].shares, 100.0);
        assert_eq!(result.trade_count(), 1);
    }

    #[test]
    fn constant_price_equity_tracks_contributions() {
        // 2024-01-02 .. roughly mid-June on weekdays.
        let series = weekday_series(&[10.0; 120]);
        let plan = CapitalPlan::new(1000.0, 100.0, 15);
        let input = SimulationInput::new(&series, plan);
        let result = BuyAndHold::new().simulate(&input).unwrap();

        let deposits = result
            .trades
            .iter()
            .filter(|t| t.reason == TradeReason::Contribution)
            .count();
        assert!(deposits >= 4);
        let expected = 1000.0 + 100.0 * deposits as f64;
        assert!((result.final_equity() - expected).abs() < 1e-9);
        for day in &result.days {
            assert!(day.cash.abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_invalid_plan() {
        let series = weekday_series(&[10.0, 11.0]);
        let input = SimulationInput::new(&series, CapitalPlan::new(-5.0, 0.0, 1));
        assert!(matches!(
            BuyAndHold::new().simulate(&input),
            Err(EngineError::InvalidPlan(_))
        ));
    }
}
