//! Sequence forecasting: scaling, windowing, a stacked LSTM and the
//! autoregressive prediction loop.

pub mod config;
pub mod forecast;
pub mod lstm;
pub mod model;
pub mod optimizer;
pub mod scaler;
pub mod window;

pub use config::ModelConfig;
pub use forecast::{roll_forward, step, ForecastPoint, RollingWindow, StepPredictor, Trend};
pub use model::{ForecastModel, TrainingReport};
pub use scaler::MinMaxScaler;
pub use window::{build_windows, Window};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model has not been trained")]
    NotTrained,

    #[error("expected input of length {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("{rows} values cannot fill a lookback of {lookback}")]
    EmptyTrainingSet { rows: usize, lookback: usize },

    #[error("non-finite value during {stage}")]
    NonFinite { stage: &'static str },

    #[error("invalid model config: {0}")]
    InvalidConfig(String),
}
