//! Parquet cache for canonical close series.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/closes.parquet` plus a `meta.json`
//! sidecar (date range, row count, BLAKE3 hash, source, `cached_at`).
//!
//! - Atomic writes (write to `.tmp`, rename into place)
//! - Freshness window: entries older than `max_age_hours` are stale
//! - Integrity check on load; corrupt files are renamed to `.quarantined`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::canonicalize::{closes_to_frame, frame_to_closes};
use super::provider::{DataError, DataSource, RawClose};

const DATA_FILE: &str = "closes.parquet";
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: DateTime<Utc>,
}

impl CacheMeta {
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.cached_at).num_seconds() as f64 / 3600.0
    }
}

/// BLAKE3 over the serialized closes.
pub fn hash_closes(closes: &[RawClose]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(closes)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={}", symbol.to_ascii_uppercase()))
    }

    fn data_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join(DATA_FILE)
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join(META_FILE)
    }

    /// Replace the cached series for `symbol`. `closes` must already be
    /// canonical.
    pub fn write(
        &self,
        symbol: &str,
        closes: &[RawClose],
        source: DataSource,
    ) -> Result<CacheMeta, DataError> {
        let (first, last) = match (closes.first(), closes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(DataError::CacheError("no rows to cache".into())),
        };

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = closes_to_frame(closes)?;
        let path = self.data_path(symbol);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first.date,
            end_date: last.date,
            row_count: closes.len(),
            data_hash: hash_closes(closes)?,
            source,
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        debug!(symbol, rows = meta.row_count, "cached series");
        Ok(meta)
    }

    /// Load the whole cached series, ascending.
    pub fn load(&self, symbol: &str) -> Result<Vec<RawClose>, DataError> {
        let path = self.data_path(symbol);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }
        match load_and_validate_parquet(&path) {
            Ok(closes) => Ok(closes),
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                let _ = fs::rename(&path, &quarantine);
                let _ = fs::remove_file(self.meta_path(symbol));
                Err(DataError::NoCachedData {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    /// Cached rows within `[start, end]`.
    pub fn load_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawClose>, DataError> {
        Ok(self
            .load(symbol)?
            .into_iter()
            .filter(|c| c.date >= start && c.date <= end)
            .collect())
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        let now = Utc::now();
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    row_count: meta.as_ref().map(|m| m.row_count),
                    age_hours: meta.as_ref().map(|m| m.age_hours(now)),
                }
            })
            .collect()
    }

    /// Every symbol with a sidecar in the cache directory.
    pub fn cached_symbols(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut symbols: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("symbol="))
                    .map(str::to_string)
            })
            .filter(|sym| self.meta_path(sym).exists())
            .collect();
        symbols.sort();
        symbols
    }

    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => {
                CoverageResult::FullyCovered
            }
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }

    /// True when the entry exists and was written less than
    /// `max_age_hours` before `now`.
    pub fn is_fresh(&self, symbol: &str, max_age_hours: u64, now: DateTime<Utc>) -> bool {
        self.get_meta(symbol)
            .is_some_and(|m| now - m.cached_at < Duration::hours(max_age_hours as i64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: Option<usize>,
    pub age_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<RawClose>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    for name in ["date", "close"] {
        if df.column(name).is_err() {
            return Err(DataError::ValidationError(format!("missing column '{name}'")));
        }
    }
    frame_to_closes(&df)
}
