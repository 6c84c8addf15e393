//! Autoregressive multi-step prediction.
//!
//! Each step is a pure transition `(window, predictor) -> (value, next window)`:
//! the prediction is appended and the oldest value dropped. Errors compound
//! with the horizon since every step feeds on earlier predictions; that
//! degradation is expected.

use super::ModelError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that maps a lookback window to the next value.
pub trait StepPredictor {
    fn lookback(&self) -> usize;

    fn predict_next(&self, window: &[f64]) -> Result<f64, ModelError>;
}

/// Fixed-length window of the most recent values, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    values: Vec<f64>,
}

impl RollingWindow {
    /// Last `lookback` values of `history`.
    pub fn seed(history: &[f64], lookback: usize) -> Result<Self, ModelError> {
        if lookback == 0 || history.len() < lookback {
            return Err(ModelError::EmptyTrainingSet {
                rows: history.len(),
                lookback,
            });
        }
        Ok(Self {
            values: history[history.len() - lookback..].to_vec(),
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// New window with `value` appended and the oldest value dropped.
    pub fn advance(&self, value: f64) -> Self {
        let mut values = Vec::with_capacity(self.values.len());
        values.extend_from_slice(&self.values[1..]);
        values.push(value);
        Self { values }
    }
}

/// One prediction step.
pub fn step<P>(predictor: &P, window: &RollingWindow) -> Result<(f64, RollingWindow), ModelError>
where
    P: StepPredictor + ?Sized,
{
    if window.values.len() != predictor.lookback() {
        return Err(ModelError::ShapeMismatch {
            expected: predictor.lookback(),
            actual: window.values.len(),
        });
    }
    let value = predictor.predict_next(&window.values)?;
    Ok((value, window.advance(value)))
}

/// Predict `steps` values past the end of `history`.
pub fn roll_forward<P>(predictor: &P, history: &[f64], steps: usize) -> Result<Vec<f64>, ModelError>
where
    P: StepPredictor + ?Sized,
{
    let mut window = RollingWindow::seed(history, predictor.lookback())?;
    let mut out = Vec::with_capacity(steps);
    for _ in 0..steps {
        let (value, next) = step(predictor, &window)?;
        out.push(value);
        window = next;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Upward,
    Downward,
}

impl Trend {
    /// Upward only when the first forecast strictly exceeds the last close.
    pub fn classify(last_actual: f64, first_forecast: f64) -> Self {
        if first_forecast > last_actual {
            Trend::Upward
        } else {
            Trend::Downward
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Upward => "upward",
            Trend::Downward => "downward",
        })
    }
}

/// A dated value in a forecast report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    /// True when `value` is a raw close rather than a model output, as for
    /// the leading `lookback` points that have no backfit.
    pub is_actual: bool,
}
