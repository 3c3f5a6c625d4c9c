//! Multi-symbol download: fetch, canonicalize, cache, with progress
//! reporting and an early stop when the provider blocks us.

use chrono::NaiveDate;

use super::cache::{CoverageResult, ParquetCache};
use super::canonicalize::Canonicalizer;
use super::provider::{DataError, DataProvider, DownloadProgress};

pub fn download_symbols(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        if !force && cache.covers_range(symbol, start, end) == CoverageResult::FullyCovered {
            let rows = cache.get_meta(symbol).map(|m| m.row_count).unwrap_or(0);
            progress.on_complete(symbol, i, total, &Ok(rows));
            succeeded += 1;
            continue;
        }

        let result = download_single(provider, cache, symbol, start, end);
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                errors.push((symbol.to_string(), e));
                failed += 1;
            }
        }

        if !provider.is_available() {
            for sym in &symbols[(i + 1)..] {
                errors.push((sym.to_string(), DataError::CircuitBreakerTripped));
                failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

/// Fetch one symbol and store it. Returns the number of rows cached.
pub fn download_single(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize, DataError> {
    let fetched = provider.fetch(symbol, start, end)?;
    let closes = Canonicalizer::run(&fetched.closes)?;
    if closes.is_empty() {
        return Err(DataError::NoData {
            symbol: symbol.to_string(),
            start,
            end,
        });
    }
    cache.write(symbol, &closes, fetched.source)?;
    Ok(closes.len())
}

#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
