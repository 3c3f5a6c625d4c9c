//! Shared bookkeeping for every simulator: cash accounts, the open holding,
//! the trade tape, and tranche-cycle progress.

use chrono::NaiveDate;

use crate::domain::{DayState, Holding, Sale, Side, TradeEvent, TradeReason};

/// Relative slack allowed when comparing a buy against the available
/// balance. Absorbs float drift from repeated tranche subtraction; the
/// amount spent is still capped at the balance.
const AFFORD_TOLERANCE: f64 = 1e-9;

/// Amount that may be spent from `available` for a buy of `amount`, or
/// `None` when the buy must be skipped. Never exceeds `available`.
pub fn affordable(available: f64, amount: f64) -> Option<f64> {
    if amount.is_nan() || amount <= 0.0 || available.is_nan() || available <= 0.0 {
        return None;
    }
    if available >= amount {
        Some(amount)
    } else if available >= amount * (1.0 - AFFORD_TOLERANCE) {
        Some(available)
    } else {
        None
    }
}

/// Progress through the current cycle: tranches deployed so far, rounded
/// up to the nearest 0.01. Zero when the budget is zero.
pub fn progress_ratio(accumulated: f64, budget: f64) -> f64 {
    if budget.is_nan() || budget <= 0.0 || !accumulated.is_finite() || accumulated <= 0.0 {
        return 0.0;
    }
    let hundredths = accumulated / budget * 100.0;
    // Snap away float noise so an exact multiple does not ceil up a notch.
    let hundredths = (hundredths * 1e6).round() / 1e6;
    hundredths.ceil() / 100.0
}

/// Which balance a trade draws from or pays into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Account {
    Cash,
    Reserve,
}

#[derive(Debug, Clone, Default)]
pub struct Book {
    pub cash: f64,
    /// Waiting cash for staged strategies, pool for rebalancers.
    pub reserve: f64,
    pub holding: Holding,
    pub trades: Vec<TradeEvent>,
}

impl Book {
    pub fn with_cash(cash: f64) -> Self {
        Self {
            cash,
            ..Self::default()
        }
    }

    pub fn with_reserve(reserve: f64) -> Self {
        Self {
            reserve,
            ..Self::default()
        }
    }

    fn balance_mut(&mut self, account: Account) -> &mut f64 {
        match account {
            Account::Cash => &mut self.cash,
            Account::Reserve => &mut self.reserve,
        }
    }

    /// Buy up to `amount` from `account`. Skips silently when the balance
    /// cannot cover it. Returns the amount spent.
    pub fn buy(
        &mut self,
        account: Account,
        date: NaiveDate,
        price: f64,
        amount: f64,
        reason: TradeReason,
    ) -> Option<f64> {
        let balance = self.balance_mut(account);
        let spend = affordable(*balance, amount)?;
        *balance -= spend;
        let quantity = self.holding.buy(spend, price);
        self.trades.push(TradeEvent {
            date,
            side: Side::Buy,
            quantity,
            price,
            amount: spend,
            reason,
        });
        Some(spend)
    }

    /// Sell `quantity` shares into `account`. Skips silently when fewer
    /// shares are held.
    pub fn sell(
        &mut self,
        account: Account,
        date: NaiveDate,
        price: f64,
        quantity: f64,
        reason: TradeReason,
    ) -> Option<Sale> {
        let sale = self.holding.sell(quantity, price)?;
        *self.balance_mut(account) += sale.proceeds;
        self.trades.push(TradeEvent {
            date,
            side: Side::Sell,
            quantity: sale.quantity,
            price,
            amount: sale.proceeds,
            reason,
        });
        Some(sale)
    }

    pub fn sell_fraction(
        &mut self,
        account: Account,
        date: NaiveDate,
        price: f64,
        fraction: f64,
        reason: TradeReason,
    ) -> Option<Sale> {
        let quantity = self.holding.shares() * fraction.clamp(0.0, 1.0);
        self.sell(account, date, price, quantity, reason)
    }

    pub fn liquidate(
        &mut self,
        account: Account,
        date: NaiveDate,
        price: f64,
        reason: TradeReason,
    ) -> Option<Sale> {
        let quantity = self.holding.shares();
        self.sell(account, date, price, quantity, reason)
    }

    /// Move all waiting cash into the cash balance.
    pub fn merge_reserve(&mut self) {
        self.cash += self.reserve;
        self.reserve = 0.0;
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.reserve + self.holding.market_value(price)
    }

    pub fn snapshot(
        &self,
        date: NaiveDate,
        price: f64,
        tranche_budget: Option<f64>,
        target_value: Option<f64>,
    ) -> DayState {
        debug_assert!(self.cash >= 0.0, "negative cash {} on {date}", self.cash);
        debug_assert!(self.reserve >= 0.0, "negative reserve {} on {date}", self.reserve);
        debug_assert!(self.holding.shares() >= 0.0, "negative shares on {date}");
        DayState {
            date,
            price,
            cash: self.cash,
            reserve: self.reserve,
            shares: self.holding.shares(),
            average_cost: self.holding.average_cost(),
            equity: self.equity(price),
            tranche_budget,
            target_value,
        }
    }
}

/// Tranche budget and deployment progress of one accumulation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cycle {
    pub budget: f64,
    pub accumulated: f64,
}

impl Cycle {
    pub fn new(capital: f64, splits: u32) -> Self {
        Self {
            budget: tranche_budget(capital, splits),
            accumulated: 0.0,
        }
    }

    pub fn progress(&self) -> f64 {
        progress_ratio(self.accumulated, self.budget)
    }

    pub fn record_buy(&mut self, amount: f64) {
        self.accumulated += amount;
    }

    /// Shrink progress in step with a partial sell that kept
    /// `remaining_fraction` of the shares.
    pub fn scale(&mut self, remaining_fraction: f64) {
        self.accumulated *= remaining_fraction.clamp(0.0, 1.0);
    }

    /// Start a new cycle sized from the current cash.
    pub fn reset(&mut self, cash: f64, splits: u32) {
        self.budget = tranche_budget(cash, splits);
        self.accumulated = 0.0;
    }
}

/// Close out the current cycle: sell whatever is held into cash, merge the
/// waiting cash, and size a fresh tranche budget from the combined balance.
pub fn restart_cycle(
    book: &mut Book,
    cycle: &mut Cycle,
    splits: u32,
    date: NaiveDate,
    price: f64,
    reason: TradeReason,
) -> Option<Sale> {
    let sale = book.liquidate(Account::Cash, date, price, reason);
    book.merge_reserve();
    cycle.reset(book.cash, splits);
    sale
}

fn tranche_budget(capital: f64, splits: u32) -> f64 {
    if splits == 0 || capital.is_nan() || capital <= 0.0 {
        0.0
    } else {
        capital / f64::from(splits)
    }
}
