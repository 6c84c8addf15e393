//! Min-max scaling of closing prices into [0, 1].

use super::ModelError;
use serde::{Deserialize, Serialize};

/// Min-max scaler fitted to one series.
///
/// A constant series has zero range; it transforms to 0 and inverts back to
/// the constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<Self, ModelError> {
        if values.is_empty() {
            return Err(ModelError::EmptyTrainingSet { rows: 0, lookback: 0 });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite { stage: "scaler fit" });
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform(&self, x: f64) -> f64 {
        (x - self.min) / self.range()
    }

    pub fn inverse(&self, y: f64) -> f64 {
        y * self.range() + self.min
    }

    pub fn transform_all(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.transform(x)).collect()
    }

    pub fn inverse_all(&self, ys: &[f64]) -> Vec<f64> {
        ys.iter().map(|&y| self.inverse(y)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn maps_extremes_to_unit_interval() {
        let s = MinMaxScaler::fit(&[10.0, 20.0, 15.0]).unwrap();
        assert_eq!(s.transform(10.0), 0.0);
        assert_eq!(s.transform(20.0), 1.0);
        assert_eq!(s.transform(15.0), 0.5);
    }

    #[test]
    fn constant_series_is_safe() {
        let s = MinMaxScaler::fit(&[5.0, 5.0]).unwrap();
        assert_eq!(s.transform(5.0), 0.0);
        assert_eq!(s.inverse(0.0), 5.0);
    }

    #[test]
    fn rejects_empty_and_nan() {
        assert!(MinMaxScaler::fit(&[]).is_err());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_err());
    }

    proptest! {
        #[test]
        fn round_trip(values in prop::collection::vec(1.0f64..10_000.0, 2..50), pick in 0usize..50) {
            let s = MinMaxScaler::fit(&values).unwrap();
            let x = values[pick % values.len()];
            let y = s.transform(x);
            prop_assert!((0.0..=1.0).contains(&y));
            prop_assert!((s.inverse(y) - x).abs() <= 1e-9 * x.abs().max(1.0));
        }
    }
}
