//! CSV price import.
//!
//! Accepts the usual vendor exports: a `date` column (any case, `Date`
//! works) plus a price column chosen in this order: `Adj Close`,
//! `adj close`, `Close`, `close`, then the first column that parses as a
//! number.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::provider::{DataError, DataProvider, DataSource, FetchResult, RawClose};

const PREFERRED_COLUMNS: &[&str] = &["Adj Close", "adj close", "Close", "close"];

/// Reads `{dir}/{SYMBOL}.csv`, or one fixed file for every symbol.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    location: Location,
}

#[derive(Debug, Clone)]
enum Location {
    Dir(PathBuf),
    File(PathBuf),
}

impl CsvProvider {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Dir(dir.into()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        match &self.location {
            Location::Dir(dir) => dir.join(format!("{symbol}.csv")),
            Location::File(path) => path.clone(),
        }
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let path = self.path_for(symbol);
        let closes: Vec<RawClose> = read_closes_file(&path)?
            .into_iter()
            .filter(|c| c.date >= start && c.date <= end)
            .collect();
        if closes.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            closes,
            source: DataSource::CsvImport,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub fn read_closes_file(path: &Path) -> Result<Vec<RawClose>, DataError> {
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::CsvError(format!("{}: {e}", path.display())))?;
    read_closes(file)
}

/// Parse closes from any CSV reader. Rows with an unparseable date are
/// skipped; unparseable prices come through as NaN for canonicalization to
/// drop.
pub fn read_closes<R: Read>(reader: R) -> Result<Vec<RawClose>, DataError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| DataError::CsvError(format!("header: {e}")))?
        .clone();

    let date_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("date"))
        .ok_or_else(|| DataError::CsvError("no date column".into()))?;

    let records = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::CsvError(format!("record: {e}")))?;

    let price_idx = PREFERRED_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .or_else(|| first_numeric_column(&headers, date_idx, &records))
        .ok_or_else(|| DataError::CsvError("no price column".into()))?;

    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        let Some(date) = record.get(date_idx).and_then(parse_date) else {
            continue;
        };
        let close = record
            .get(price_idx)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN);
        out.push(RawClose::new(date, close));
    }
    Ok(out)
}

fn first_numeric_column(
    headers: &csv::StringRecord,
    date_idx: usize,
    records: &[csv::StringRecord],
) -> Option<usize> {
    let first = records.first()?;
    (0..headers.len())
        .filter(|&i| i != date_idx)
        .find(|&i| first.get(i).is_some_and(|v| v.trim().parse::<f64>().is_ok()))
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
