//! Trade tape and per-day simulator snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Why a simulator traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    /// Day-0 deployment of the initial capital.
    Initial,
    /// Monthly deposit invested on arrival.
    Contribution,
    Tranche,
    HalfTranche,
    /// Full exit at the profit target.
    ProfitTarget,
    /// 75% exit at the profit target (V3).
    Graduation,
    /// 25% protective exit at the star price (V3).
    QuarterExit,
    /// Forced 25% exit after full deployment (V3).
    CyclicLiquidation,
    /// One proportional unit (tiered exit).
    UnitExit,
    /// Dust residue swept before a cycle reset.
    Sweep,
    Rebalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub date: NaiveDate,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    /// Cash spent (buy) or received (sell).
    pub amount: f64,
    pub reason: TradeReason,
}

/// End-of-day state of one simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayState {
    pub date: NaiveDate,
    pub price: f64,
    /// Realized, uninvested capital.
    pub cash: f64,
    /// Waiting cash (staged strategies) or pool (rebalancers).
    pub reserve: f64,
    pub shares: f64,
    pub average_cost: f64,
    pub equity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tranche_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<f64>,
}
