//! Price loading and data resolution for the runner.
//!
//! Resolves one symbol at a time with the fallback policy:
//! 1. Fresh cache entry spanning the range → use it
//! 2. Provider available → download, canonicalize, cache
//! 3. Provider failed but a stale entry exists → use it (warned)
//! 4. `synthetic` enabled → seeded random walk (tagged)
//! 5. Otherwise → fail with a clear error
//!
//! The benchmark is inner-joined onto the asset's dates so both series
//! line up sample for sample.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use splitlab_core::data::{
    Canonicalizer, DataError, DataProvider, DataSource, ParquetCache, RawClose,
};
use splitlab_core::domain::{BenchmarkSeries, PriceSeries};
use splitlab_core::indicators::sma;
use splitlab_core::EngineError;
use thiserror::Error;
use tracing::{debug, warn};

/// Cache freshness window used when none is configured.
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

/// Non-trading days tolerated between a requested range edge and the
/// first/last cached row.
const COVERAGE_SLACK_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "no cached data for '{symbol}' and no network access (use --synthetic for synthetic data)"
    )]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("'{ticker}' and benchmark '{benchmark}' share no trading dates")]
    NoOverlap { ticker: String, benchmark: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic closes when real data is unavailable.
    pub synthetic: bool,
    /// Re-download even if cached.
    pub force: bool,
    pub max_age_hours: u64,
}

impl LoadOptions {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            offline: false,
            synthetic: false,
            force: false,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

/// Canonical closes for one symbol and where they came from.
#[derive(Debug, Clone)]
pub struct LoadedCloses {
    pub symbol: String,
    pub closes: Vec<RawClose>,
    pub source: DataSource,
}

/// Validated engine inputs for a run.
#[derive(Debug)]
pub struct LoadedData {
    pub prices: PriceSeries,
    pub benchmark: Option<BenchmarkSeries>,
    pub sources: BTreeMap<String, DataSource>,
    /// BLAKE3 over every close fed to the engine.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Load the asset and, when requested, its benchmark with `ma_period`
/// moving average.
pub fn load_prices(
    ticker: &str,
    benchmark: Option<(&str, usize)>,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    let asset = load_closes(ticker, cache, provider, opts)?;
    let mut sources = BTreeMap::new();
    sources.insert(asset.symbol.clone(), asset.source);

    let (prices, benchmark) = match benchmark {
        None => (to_series(ticker, &asset.closes)?, None),
        Some((symbol, ma_period)) => {
            let bench = load_closes(symbol, cache, provider, opts)?;
            sources.insert(bench.symbol.clone(), bench.source);
            let (joined, bench_series) = join_benchmark(&asset.closes, &bench, ma_period);
            if joined.is_empty() {
                return Err(LoadError::NoOverlap {
                    ticker: ticker.to_string(),
                    benchmark: symbol.to_string(),
                });
            }
            debug!(
                ticker,
                benchmark = symbol,
                asset_rows = asset.closes.len(),
                joined_rows = joined.len(),
                "joined benchmark"
            );
            (to_series(ticker, &joined)?, Some(bench_series))
        }
    };

    let has_synthetic = sources.values().any(|s| s.is_synthetic());
    let dataset_hash = compute_dataset_hash(&prices, benchmark.as_ref());

    Ok(LoadedData {
        prices,
        benchmark,
        sources,
        dataset_hash,
        has_synthetic,
    })
}

/// Resolve one symbol through cache, provider and synthetic fallback.
pub fn load_closes(
    symbol: &str,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<LoadedCloses, LoadError> {
    let loaded = |closes: Vec<RawClose>, source: DataSource| LoadedCloses {
        symbol: symbol.to_string(),
        closes,
        source,
    };

    // Step 1: fresh cache
    if !opts.force && cache_is_usable(cache, symbol, opts, Utc::now()) {
        let closes = cache.load_range(symbol, opts.start, opts.end)?;
        if !closes.is_empty() {
            debug!(symbol, rows = closes.len(), "using cached closes");
            return Ok(loaded(closes, DataSource::Cache));
        }
    }

    // Step 2: download
    let mut failure = None;
    if !opts.offline {
        if let Some(prov) = provider.filter(|p| p.is_available()) {
            match fetch_and_cache(prov, cache, symbol, opts) {
                Ok((closes, source)) => return Ok(loaded(closes, source)),
                Err(e) => {
                    warn!(symbol, provider = prov.name(), error = %e, "download failed");
                    failure = Some(e.to_string());
                }
            }
        }
    }

    // Step 3: stale cache
    if let Ok(closes) = cache.load_range(symbol, opts.start, opts.end) {
        if !closes.is_empty() {
            warn!(symbol, rows = closes.len(), "falling back to stale cached closes");
            return Ok(loaded(closes, DataSource::Cache));
        }
    }

    // Step 4: synthetic
    if opts.synthetic {
        warn!(symbol, "generating synthetic closes; results are tagged synthetic");
        let closes = generate_synthetic_closes(symbol, opts.start, opts.end);
        return Ok(loaded(closes, DataSource::Synthetic));
    }

    // Step 5: fail
    if opts.offline {
        return Err(LoadError::NoCachedDataOffline {
            symbol: symbol.to_string(),
        });
    }
    Err(LoadError::DownloadFailed {
        symbol: symbol.to_string(),
        reason: failure.unwrap_or_else(|| "no provider available".into()),
    })
}

fn fetch_and_cache(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbol: &str,
    opts: &LoadOptions,
) -> Result<(Vec<RawClose>, DataSource), DataError> {
    let fetched = provider.fetch(symbol, opts.start, opts.end)?;
    let closes = Canonicalizer::run(&fetched.closes)?;
    if closes.is_empty() {
        return Err(DataError::NoData {
            symbol: symbol.to_string(),
            start: opts.start,
            end: opts.end,
        });
    }
    if let Err(e) = cache.write(symbol, &closes, fetched.source) {
        warn!(symbol, error = %e, "could not cache downloaded closes");
    }
    Ok((closes, fetched.source))
}

/// Fresh entry whose rows reach both edges of the range, give or take a
/// week of holidays and weekends.
fn cache_is_usable(
    cache: &ParquetCache,
    symbol: &str,
    opts: &LoadOptions,
    now: DateTime<Utc>,
) -> bool {
    if !cache.is_fresh(symbol, opts.max_age_hours, now) {
        return false;
    }
    let slack = Duration::days(COVERAGE_SLACK_DAYS);
    cache.get_meta(symbol).is_some_and(|meta| {
        meta.start_date <= opts.start + slack && meta.end_date + slack >= opts.end
    })
}

fn to_series(symbol: &str, closes: &[RawClose]) -> Result<PriceSeries, EngineError> {
    let dates: Vec<NaiveDate> = closes.iter().map(|c| c.date).collect();
    let prices: Vec<f64> = closes.iter().map(|c| c.close).collect();
    PriceSeries::from_parts(symbol, &dates, &prices)
}

/// Keep only asset rows with a benchmark close on the same date. The moving
/// average is taken over the full benchmark history before the join.
fn join_benchmark(
    asset: &[RawClose],
    bench: &LoadedCloses,
    ma_period: usize,
) -> (Vec<RawClose>, BenchmarkSeries) {
    let bench_prices: Vec<f64> = bench.closes.iter().map(|c| c.close).collect();
    let bench_ma = sma(&bench_prices, ma_period);
    let by_date: HashMap<NaiveDate, usize> = bench
        .closes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.date, i))
        .collect();

    let mut joined = Vec::with_capacity(asset.len());
    let mut closes = Vec::with_capacity(asset.len());
    let mut moving_average = Vec::with_capacity(asset.len());
    for row in asset {
        if let Some(&i) = by_date.get(&row.date) {
            joined.push(*row);
            closes.push(bench_prices[i]);
            moving_average.push(bench_ma[i]);
        }
    }

    let series = BenchmarkSeries {
        symbol: bench.symbol.clone(),
        closes,
        moving_average,
        ma_period,
    };
    (joined, series)
}

/// Deterministic BLAKE3 hash over the engine inputs.
fn compute_dataset_hash(prices: &PriceSeries, benchmark: Option<&BenchmarkSeries>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prices.symbol().as_bytes());
    for point in prices.points() {
        hasher.update(point.date.to_string().as_bytes());
        hasher.update(&point.price.to_le_bytes());
    }
    if let Some(bench) = benchmark {
        hasher.update(bench.symbol.as_bytes());
        for close in &bench.closes {
            hasher.update(&close.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Seeded random walk on weekdays, starting at 100. Clearly fake and
/// tagged as synthetic by the caller.
pub fn generate_synthetic_closes(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawClose> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut closes = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            price *= 1.0 + daily_return;
            closes.push(RawClose::new(current, price));
        }
        current += Duration::days(1);
    }
    closes
}
