//! Price data: providers, canonicalization, and the Parquet cache.

pub mod cache;
pub mod canonicalize;
pub mod circuit_breaker;
pub mod csv_import;
pub mod download;
pub mod provider;
pub mod yahoo;

pub use cache::{CacheMeta, CacheStatus, CoverageResult, ParquetCache};
pub use canonicalize::Canonicalizer;
pub use circuit_breaker::CircuitBreaker;
pub use csv_import::CsvProvider;
pub use download::{download_single, download_symbols, DownloadSummary};
pub use provider::{
    DataError, DataProvider, DataSource, DownloadProgress, FetchResult, RawClose, StdoutProgress,
};
pub use yahoo::YahooProvider;
