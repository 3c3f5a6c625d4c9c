//! Monthly deposit scheduling and the contributed-principal curve.
//!
//! A deposit lands on the first trading day on or after the target
//! day-of-month, exactly once per calendar month. When the target day falls
//! after a month's last trading day, that month's deposit is skipped.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::PriceSeries;
use crate::error::EngineError;

/// Latest allowed deposit day; every month has at least 28 days.
pub const MAX_DEPOSIT_DAY: u32 = 28;

/// Calendar month key. Year is carried so a twelve-month data gap can
/// never alias two different months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// True iff `date` is in a month other than the last deposit's and its
/// day-of-month has reached `target_day`.
pub fn is_deposit_due(date: NaiveDate, last_deposit: Option<YearMonth>, target_day: u32) -> bool {
    last_deposit != Some(YearMonth::of(date)) && date.day() >= target_day
}

/// Cash-flow plan shared by every strategy in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalPlan {
    pub initial_capital: f64,
    pub monthly_amount: f64,
    pub deposit_day: u32,
}

impl CapitalPlan {
    pub fn new(initial_capital: f64, monthly_amount: f64, deposit_day: u32) -> Self {
        Self {
            initial_capital,
            monthly_amount,
            deposit_day,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(EngineError::InvalidPlan(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !self.monthly_amount.is_finite() || self.monthly_amount < 0.0 {
            return Err(EngineError::InvalidPlan(format!(
                "monthly amount must be >= 0, got {}",
                self.monthly_amount
            )));
        }
        if !(1..=MAX_DEPOSIT_DAY).contains(&self.deposit_day) {
            return Err(EngineError::InvalidPlan(format!(
                "deposit day must be in 1..={MAX_DEPOSIT_DAY}, got {}",
                self.deposit_day
            )));
        }
        Ok(())
    }
}

/// Mutable deposit state owned by one simulator loop.
#[derive(Debug, Clone)]
pub struct DepositSchedule {
    amount: f64,
    target_day: u32,
    last_deposit: Option<YearMonth>,
}

impl DepositSchedule {
    /// A schedule that has never deposited.
    pub fn new(amount: f64, target_day: u32) -> Self {
        Self {
            amount,
            target_day,
            last_deposit: None,
        }
    }

    /// Schedule for a run starting on `start`: the start month is treated
    /// as already funded by the initial capital.
    pub fn for_run(plan: &CapitalPlan, start: NaiveDate) -> Self {
        Self {
            amount: plan.monthly_amount,
            target_day: plan.deposit_day,
            last_deposit: Some(YearMonth::of(start)),
        }
    }

    /// Returns the deposit amount if one is due on `date`, recording the
    /// month so it cannot trigger again.
    pub fn poll(&mut self, date: NaiveDate) -> Option<f64> {
        if is_deposit_due(date, self.last_deposit, self.target_day) {
            self.last_deposit = Some(YearMonth::of(date));
            Some(self.amount)
        } else {
            None
        }
    }

    pub fn last_deposit(&self) -> Option<YearMonth> {
        self.last_deposit
    }
}

/// Cumulative contributed capital per day: initial capital plus every
/// deposit triggered so far. Independent of any trading decision.
pub fn principal_curve(prices: &PriceSeries, plan: &CapitalPlan) -> Vec<f64> {
    let mut schedule = DepositSchedule::for_run(plan, prices.first().date);
    let mut principal = plan.initial_capital;
    prices
        .points()
        .iter()
        .map(|p| {
            if let Some(amount) = schedule.poll(p.date) {
                principal += amount;
            }
            principal
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn deposits_once_per_month_on_or_after_target() {
        let dates = [
            date(2024, 1, 24),
            date(2024, 1, 26),
            date(2024, 2, 24),
            date(2024, 2, 26),
        ];
        let mut schedule = DepositSchedule::new(100.0, 25);
        let triggered: Vec<NaiveDate> = dates
            .iter()
            .copied()
            .filter(|&d| schedule.poll(d).is_some())
            .collect();
        assert_eq!(triggered, vec![date(2024, 1, 26), date(2024, 2, 26)]);
    }

    #[test]
    fn same_month_never_triggers_twice() {
        let mut schedule = DepositSchedule::new(100.0, 5);
        assert!(schedule.poll(date(2024, 3, 5)).is_some());
        assert!(schedule.poll(date(2024, 3, 6)).is_none());
        assert!(schedule.poll(date(2024, 3, 29)).is_none());
        assert!(schedule.poll(date(2024, 4, 8)).is_some());
    }

    #[test]
    fn target_after_last_trading_day_skips_month() {
        // 2026-02-28 is a Saturday: February's last session is the 27th,
        // so a day-28 target never fires in February.
        let mut schedule = DepositSchedule::new(100.0, 28);
        assert!(schedule.poll(date(2026, 2, 27)).is_none());
        assert!(schedule.poll(date(2026, 3, 2)).is_none());
        assert!(schedule.poll(date(2026, 3, 30)).is_some());
    }

    #[test]
    fn due_check_is_pure() {
        let last = Some(YearMonth::of(date(2024, 1, 26)));
        assert!(!is_deposit_due(date(2024, 1, 30), last, 25));
        assert!(is_deposit_due(date(2024, 2, 25), last, 25));
        assert!(!is_deposit_due(date(2024, 2, 24), last, 25));
        assert!(is_deposit_due(date(2024, 1, 25), None, 25));
    }

    #[test]
    fn year_is_part_of_the_month_key() {
        let last = Some(YearMonth::of(date(2023, 6, 10)));
        assert!(is_deposit_due(date(2024, 6, 10), last, 1));
    }

    #[test]
    fn start_month_is_funded_by_initial_capital() {
        let plan = CapitalPlan::new(1000.0, 100.0, 1);
        let mut schedule = DepositSchedule::for_run(&plan, date(2024, 1, 2));
        assert!(schedule.poll(date(2024, 1, 3)).is_none());
        assert_eq!(schedule.poll(date(2024, 2, 1)), Some(100.0));
    }

    #[test]
    fn principal_curve_accumulates_deposits() {
        let dates = [date(2024, 1, 2), date(2024, 1, 26), date(2024, 2, 26)];
        let series = PriceSeries::from_parts("X", &dates, &[1.0, 1.0, 1.0]).unwrap();
        let plan = CapitalPlan::new(1000.0, 50.0, 25);
        assert_eq!(principal_curve(&series, &plan), vec![1000.0, 1000.0, 1050.0]);
    }

    #[test]
    fn plan_validation() {
        assert!(CapitalPlan::new(1000.0, 0.0, 1).validate().is_ok());
        assert!(CapitalPlan::new(0.0, 0.0, 1).validate().is_err());
        assert!(CapitalPlan::new(1000.0, -1.0, 1).validate().is_err());
        assert!(CapitalPlan::new(1000.0, 0.0, 0).validate().is_err());
        assert!(CapitalPlan::new(1000.0, 0.0, 29).validate().is_err());
    }
}
