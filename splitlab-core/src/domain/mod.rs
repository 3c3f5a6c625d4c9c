//! Domain types for SplitLab

pub mod holding;
pub mod series;
pub mod trade;

pub use holding::{Holding, Sale, DUST_VALUE};
pub use series::{BenchmarkSeries, PricePoint, PriceSeries};
pub use trade::{DayState, Side, TradeEvent, TradeReason};
