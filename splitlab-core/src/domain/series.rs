//! Price series — the immutable daily input to every simulator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::indicators::sma;

/// One trading day's closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Validated daily close series: non-empty, strictly increasing dates,
/// every price finite and > 0. Deserialization runs the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedSeries")]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

#[derive(Deserialize)]
struct UncheckedSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl TryFrom<UncheckedSeries> for PriceSeries {
    type Error = EngineError;

    fn try_from(raw: UncheckedSeries) -> Result<Self, Self::Error> {
        Self::new(raw.symbol, raw.points)
    }
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, EngineError> {
        if points.is_empty() {
            return Err(EngineError::EmptySeries);
        }
        for (index, point) in points.iter().enumerate() {
            if !point.price.is_finite() || point.price <= 0.0 {
                return Err(EngineError::NonPositivePrice {
                    index,
                    date: point.date,
                    price: point.price,
                });
            }
            if index > 0 && point.date <= points[index - 1].date {
                return Err(EngineError::UnorderedDates {
                    index,
                    date: point.date,
                });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            points,
        })
    }

    /// Build from parallel date/price slices.
    pub fn from_parts(
        symbol: impl Into<String>,
        dates: &[NaiveDate],
        prices: &[f64],
    ) -> Result<Self, EngineError> {
        if dates.len() != prices.len() {
            return Err(EngineError::LengthMismatch {
                dates: dates.len(),
                prices: prices.len(),
            });
        }
        let points = dates
            .iter()
            .zip(prices)
            .map(|(&date, &price)| PricePoint::new(date, price))
            .collect();
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> PricePoint {
        self.points[0]
    }

    pub fn last(&self) -> PricePoint {
        self.points[self.points.len() - 1]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }
}

/// Benchmark index closes aligned 1:1 with an asset's price series,
/// plus their trailing simple moving average (NaN during warm-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    pub symbol: String,
    pub closes: Vec<f64>,
    pub moving_average: Vec<f64>,
    pub ma_period: usize,
}

impl BenchmarkSeries {
    pub fn from_closes(symbol: impl Into<String>, closes: Vec<f64>, ma_period: usize) -> Self {
        let moving_average = sma(&closes, ma_period);
        Self {
            symbol: symbol.into(),
            closes,
            moving_average,
            ma_period,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// True when the benchmark closes below its moving average on `index`.
    /// Warm-up days (no average yet) never count as below.
    pub fn below_average(&self, index: usize) -> bool {
        match (self.closes.get(index), self.moving_average.get(index)) {
            (Some(&close), Some(&ma)) if ma.is_finite() => close < ma,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn rejects_empty_series() {
        assert_eq!(
            PriceSeries::new("TQQQ", vec![]).unwrap_err(),
            EngineError::EmptySeries
        );
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = PriceSeries::new(
            "TQQQ",
            vec![PricePoint::new(d(2), 10.0), PricePoint::new(d(3), 0.0)],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NonPositivePrice { index: 1, .. }));
    }

    #[test]
    fn rejects_nan_price() {
        let err = PriceSeries::new("TQQQ", vec![PricePoint::new(d(2), f64::NAN)]).unwrap_err();
        assert!(matches!(err, EngineError::NonPositivePrice { index: 0, .. }));
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = PriceSeries::new(
            "TQQQ",
            vec![PricePoint::new(d(2), 10.0), PricePoint::new(d(2), 11.0)],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnorderedDates { index: 1, .. }));
    }

    #[test]
    fn from_parts_keeps_order() {
        let series = PriceSeries::from_parts("QQQ", &[d(2), d(3)], &[1.0, 2.0]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().price, 1.0);
        assert_eq!(series.last().date, d(3));
        assert_eq!(series.symbol(), "QQQ");
    }

    #[test]
    fn from_parts_rejects_length_mismatch() {
        let err = PriceSeries::from_parts("QQQ", &[d(2), d(3), d(4)], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, EngineError::LengthMismatch { dates: 3, prices: 2 });
    }

    #[test]
    fn deserialization_validates() {
        let series = PriceSeries::from_parts("QQQ", &[d(2), d(3)], &[1.0, 2.0]).unwrap();
        let json = serde_json::to_string(&series).unwrap();
        let back: PriceSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, series);

        let empty = r#"{"symbol":"QQQ","points":[]}"#;
        assert!(serde_json::from_str::<PriceSeries>(empty).is_err());
        let unordered = r#"{"symbol":"QQQ","points":[
            {"date":"2024-01-03","price":1.0},{"date":"2024-01-02","price":2.0}]}"#;
        assert!(serde_json::from_str::<PriceSeries>(unordered).is_err());
    }

    #[test]
    fn benchmark_below_average_ignores_warmup() {
        let bench = BenchmarkSeries::from_closes("QQQ", vec![10.0, 10.0, 4.0], 3);
        assert!(!bench.below_average(0));
        assert!(!bench.below_average(1));
        // avg(10, 10, 4) = 8 > 4
        assert!(bench.below_average(2));
    }
}
