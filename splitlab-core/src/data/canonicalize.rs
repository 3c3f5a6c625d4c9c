//! Canonical form for a close series: ascending dates, one row per date
//! (first occurrence wins), finite positive closes only.
//!
//! Runs as a polars lazy query over a two-column `date`/`close` frame, the
//! same frame layout the Parquet cache stores.

use chrono::NaiveDate;
use polars::prelude::*;

use super::provider::{DataError, RawClose};

pub struct Canonicalizer;

impl Canonicalizer {
    /// Sort by date and keep the first row of each date.
    pub fn canonicalize(df: LazyFrame) -> LazyFrame {
        df.sort(
            ["date"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(Some(vec!["date".into()]), UniqueKeepStrategy::First)
    }

    /// Drop null, NaN, infinite and non-positive closes.
    pub fn validate(df: LazyFrame) -> LazyFrame {
        df.filter(
            col("close")
                .is_not_null()
                .and(col("close").is_not_nan())
                .and(col("close").gt(lit(0.0)))
                .and(col("close").lt(lit(f64::INFINITY))),
        )
    }

    /// Full pipeline over raw provider output.
    pub fn run(closes: &[RawClose]) -> Result<Vec<RawClose>, DataError> {
        if closes.is_empty() {
            return Ok(Vec::new());
        }
        let df = closes_to_frame(closes)?;
        // Validate before dedupe so a bad first row does not hide a good
        // duplicate.
        let clean = Self::canonicalize(Self::validate(df.lazy()))
            .collect()
            .map_err(|e| DataError::ValidationError(format!("canonicalize: {e}")))?;
        frame_to_closes(&clean)
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// `date` (Date) + `close` (f64) frame.
pub(crate) fn closes_to_frame(closes: &[RawClose]) -> Result<DataFrame, DataError> {
    let epoch = epoch();
    let dates: Vec<i32> = closes
        .iter()
        .map(|c| (c.date - epoch).num_days() as i32)
        .collect();
    let values: Vec<f64> = closes.iter().map(|c| c.close).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("close".into(), values),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

pub(crate) fn frame_to_closes(df: &DataFrame) -> Result<Vec<RawClose>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let date_ca = df
        .column("date")
        .map_err(map_err)?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
    let close_ca = df
        .column("close")
        .map_err(map_err)?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("close column type: {e}")))?;

    let epoch = epoch();
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        out.push(RawClose::new(
            epoch + chrono::Duration::days(i64::from(days)),
            close_ca.get(i).unwrap_or(f64::NAN),
        ));
    }
    Ok(out)
}
