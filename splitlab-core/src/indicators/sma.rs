//! Simple Moving Average (SMA).
//!
//! Rolling mean over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

/// Trailing simple moving average of `values`.
///
/// Entries before the first full window, and windows containing NaN, are NaN.
/// A period of zero yields an all-NaN series.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    Sma::new(period).compute(values)
}

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    pub fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    pub fn compute(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        let mut result = vec![f64::NAN; n];

        if self.period == 0 || n < self.period {
            return result;
        }

        let mut sum = 0.0;
        let mut nan_in_window = false;
        for &v in values.iter().take(self.period) {
            if v.is_nan() {
                nan_in_window = true;
            }
            sum += v;
        }

        if !nan_in_window {
            result[self.period - 1] = sum / self.period as f64;
        }

        for i in self.period..n {
            let leaving = values[i - self.period];
            let entering = values[i];
            sum = sum - leaving + entering;

            // NaN poisons the running sum; rescan the window instead.
            if entering.is_nan() || leaving.is_nan() || nan_in_window {
                nan_in_window = false;
                sum = 0.0;
                for &v in &values[(i + 1 - self.period)..=i] {
                    if v.is_nan() {
                        nan_in_window = true;
                    }
                    sum += v;
                }
                if nan_in_window {
                    continue;
                }
            }

            result[i] = sum / self.period as f64;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-10,
            "actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn sma_5_basic() {
        let result = sma(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0], 5);

        assert_eq!(result.len(), 7);
        for v in result.iter().take(4) {
            assert!(v.is_nan());
        }
        assert_approx(result[4], 12.0);
        assert_approx(result[5], 13.0);
        assert_approx(result[6], 14.0);
    }

    #[test]
    fn sma_1_is_identity() {
        let result = sma(&[100.0, 200.0, 300.0], 1);
        assert_approx(result[0], 100.0);
        assert_approx(result[2], 300.0);
    }

    #[test]
    fn sma_nan_propagation() {
        let result = sma(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0);
    }

    #[test]
    fn sma_too_few_values() {
        assert!(sma(&[10.0, 11.0], 5).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_zero_period_is_all_nan() {
        assert!(sma(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
        assert_eq!(Sma::new(0).lookback(), 0);
        assert_eq!(Sma::new(200).lookback(), 199);
    }
}
