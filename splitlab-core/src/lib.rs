//! SplitLab Core: price series, deposit scheduling, strategy simulators,
//! data providers and the Parquet cache.
//!
//! - Domain types (price series, benchmark, holding, day states, trades)
//! - Month-keyed deposit scheduler and contributed-principal curve
//! - Seven strategy simulators behind one `Simulator` trait
//! - Data providers (Yahoo, CSV), canonicalization, Parquet cache

pub mod data;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod schedule;
pub mod sentiment;
pub mod strategy;

pub use error::EngineError;
pub use schedule::{principal_curve, CapitalPlan, DepositSchedule};
pub use strategy::{SimulationInput, SimulationResult, Simulator, StrategyConfig};
