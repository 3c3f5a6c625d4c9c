//! Market sentiment (fear/greed, 0..=100) used to gate buying in drawdowns.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Neutral reading used when nothing better is known.
pub const NEUTRAL_SENTIMENT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SentimentSource {
    /// One value for the whole backtest.
    Constant { value: f64 },
    /// Historical readings keyed by `"YYYY-MM"`; months not in the table
    /// read as `fallback`.
    Monthly {
        table: BTreeMap<String, f64>,
        #[serde(default = "neutral")]
        fallback: f64,
    },
}

fn neutral() -> f64 {
    NEUTRAL_SENTIMENT
}

impl Default for SentimentSource {
    fn default() -> Self {
        Self::Constant {
            value: NEUTRAL_SENTIMENT,
        }
    }
}

impl SentimentSource {
    pub fn value_on(&self, date: NaiveDate) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Monthly { table, fallback } => table
                .get(&date.format("%Y-%m").to_string())
                .copied()
                .unwrap_or(*fallback),
        }
    }
}
