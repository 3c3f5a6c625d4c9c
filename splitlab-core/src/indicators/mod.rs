//! Indicators computed over a benchmark series before the simulation loop.

pub mod sma;

pub use sma::{sma, Sma};
