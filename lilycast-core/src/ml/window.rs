//! Sliding windows over a scaled series.

use super::ModelError;

/// `lookback` consecutive scaled values and the value that follows them.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: f64,
}

/// For `i` in `lookback..n`: input `scaled[i-lookback..i]`, target `scaled[i]`.
/// Produces exactly `n - lookback` windows; `n <= lookback` is an error.
pub fn build_windows(scaled: &[f64], lookback: usize) -> Result<Vec<Window>, ModelError> {
    if lookback == 0 || scaled.len() <= lookback {
        return Err(ModelError::EmptyTrainingSet {
            rows: scaled.len(),
            lookback,
        });
    }
    Ok((lookback..scaled.len())
        .map(|i| Window {
            input: scaled[i - lookback..i].to_vec(),
            target: scaled[i],
        })
        .collect())
}
