//! Engine error types.
//!
//! These cover invalid inputs only. Throttled trades (insufficient cash or
//! shares) are never errors; simulators skip them silently.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("no data: price series is empty")]
    EmptySeries,

    #[error("price at index {index} ({date}) is not a positive finite number: {price}")]
    NonPositivePrice {
        index: usize,
        date: NaiveDate,
        price: f64,
    },

    #[error("dates must be strictly increasing: index {index} ({date}) is out of order")]
    UnorderedDates { index: usize, date: NaiveDate },

    #[error("{dates} dates but {prices} prices")]
    LengthMismatch { dates: usize, prices: usize },

    #[error("invalid capital plan: {0}")]
    InvalidPlan(String),

    #[error("invalid parameter for {strategy}: {reason}")]
    InvalidParameter { strategy: String, reason: String },

    #[error("strategy '{strategy}' requires a benchmark series")]
    MissingBenchmark { strategy: String },

    #[error("benchmark has {actual} samples but the price series has {expected}")]
    BenchmarkMismatch { expected: usize, actual: usize },
}

impl EngineError {
    pub(crate) fn param(strategy: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }
}
