//! Open position with a numerically stable average cost.
//!
//! Shares and total cost basis are accumulated separately; the average cost
//! is only derived on read. Repeated weighted-average recomputation over
//! thousands of days would otherwise compound rounding error.

use serde::{Deserialize, Serialize};

/// Fraction of the position treated as "everything" when selling, so that a
/// sell of `shares * 1.0` computed through floats always flattens.
const FULL_SELL_TOLERANCE: f64 = 1e-12;

/// Positions worth less than this (in currency units) are dust.
pub const DUST_VALUE: f64 = 0.01;

/// Result of a successful sell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sale {
    pub quantity: f64,
    pub proceeds: f64,
    /// Cost basis released by the sale.
    pub cost: f64,
}

impl Sale {
    pub fn realized_profit(&self) -> f64 {
        self.proceeds - self.cost
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    shares: f64,
    cost_basis: f64,
}

impl Holding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shares(&self) -> f64 {
        self.shares
    }

    pub fn cost_basis(&self) -> f64 {
        self.cost_basis
    }

    /// Volume-weighted average entry price; 0 when flat.
    pub fn average_cost(&self) -> f64 {
        if self.shares > 0.0 {
            self.cost_basis / self.shares
        } else {
            0.0
        }
    }

    pub fn is_flat(&self) -> bool {
        self.shares <= 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    /// True when the position is empty or worth less than [`DUST_VALUE`].
    pub fn is_dust(&self, price: f64) -> bool {
        self.is_flat() || self.market_value(price) < DUST_VALUE
    }

    /// Unrealized gain in percent of the average cost; 0 when flat.
    pub fn gain_pct(&self, price: f64) -> f64 {
        let avg = self.average_cost();
        if avg > 0.0 {
            (price / avg - 1.0) * 100.0
        } else {
            0.0
        }
    }

    /// Spend `amount` at `price`. Returns the quantity bought.
    ///
    /// Callers are responsible for checking that `amount` is available.
    pub fn buy(&mut self, amount: f64, price: f64) -> f64 {
        if amount <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        let quantity = amount / price;
        self.shares += quantity;
        self.cost_basis += amount;
        quantity
    }

    /// Sell `quantity` shares at `price`.
    ///
    /// Returns `None` (and leaves the holding untouched) when the quantity is
    /// not positive or exceeds the shares held.
    pub fn sell(&mut self, quantity: f64, price: f64) -> Option<Sale> {
        if quantity <= 0.0 || self.shares <= 0.0 {
            return None;
        }
        let full = self.shares * (1.0 - FULL_SELL_TOLERANCE);
        if quantity >= full {
            if quantity > self.shares * (1.0 + FULL_SELL_TOLERANCE) {
                return None;
            }
            return Some(self.sell_all(price));
        }
        let cost = self.cost_basis * (quantity / self.shares);
        self.shares -= quantity;
        self.cost_basis -= cost;
        Some(Sale {
            quantity,
            proceeds: quantity * price,
            cost,
        })
    }

    /// Sell `fraction` (0..=1) of the current shares.
    pub fn sell_fraction(&mut self, fraction: f64, price: f64) -> Option<Sale> {
        let fraction = fraction.clamp(0.0, 1.0);
        self.sell(self.shares * fraction, price)
    }

    /// Liquidate the whole position. Both shares and cost basis end at zero.
    pub fn sell_all(&mut self, price: f64) -> Sale {
        let sale = Sale {
            quantity: self.shares,
            proceeds: self.shares * price,
            cost: self.cost_basis,
        };
        self.shares = 0.0;
        self.cost_basis = 0.0;
        sale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_holding_has_zero_average_cost() {
        let h = Holding::new();
        assert_eq!(h.average_cost(), 0.0);
        assert_eq!(h.gain_pct(50.0), 0.0);
        assert!(h.is_flat());
    }

    #[test]
    fn average_cost_is_cost_weighted() {
        let mut h = Holding::new();
        h.buy(100.0, 10.0); // 10 shares
        h.buy(100.0, 20.0); // 5 shares
        assert!((h.shares() - 15.0).abs() < 1e-12);
        assert!((h.average_cost() - 200.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn partial_sell_keeps_average_cost() {
        let mut h = Holding::new();
        h.buy(1000.0, 10.0);
        let sale = h.sell_fraction(0.25, 12.0).unwrap();
        assert!((sale.quantity - 25.0).abs() < 1e-12);
        assert!((sale.proceeds - 300.0).abs() < 1e-9);
        assert!((sale.cost - 250.0).abs() < 1e-9);
        assert!((sale.realized_profit() - 50.0).abs() < 1e-9);
        assert!((h.average_cost() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn sell_more_than_held_is_rejected() {
        let mut h = Holding::new();
        h.buy(100.0, 10.0);
        assert!(h.sell(11.0, 10.0).is_none());
        assert_eq!(h.shares(), 10.0);
    }

    #[test]
    fn full_sell_flattens_cost_basis() {
        let mut h = Holding::new();
        h.buy(100.0, 3.0);
        h.buy(100.0, 7.0);
        let qty = h.shares();
        h.sell(qty, 5.0).unwrap();
        assert_eq!(h.shares(), 0.0);
        assert_eq!(h.cost_basis(), 0.0);
        assert_eq!(h.average_cost(), 0.0);
    }

    #[test]
    fn dust_detection() {
        let mut h = Holding::new();
        assert!(h.is_dust(10.0));
        h.buy(0.001, 10.0);
        assert!(h.is_dust(10.0));
        h.buy(10.0, 10.0);
        assert!(!h.is_dust(10.0));
    }
}
