//! Model hyper-parameters.

use super::ModelError;
use serde::{Deserialize, Serialize};

/// Hyper-parameters for [`ForecastModel`](super::ForecastModel).
///
/// Defaults: two stacked LSTM layers of 50 units, dropout 0.2 after each,
/// 10 epochs of Adam (lr 0.001) on batches of 32 over 60-step windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub lookback: usize,
    pub hidden_units: usize,
    pub layers: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Global gradient-norm cap; `None` disables clipping.
    pub gradient_clip: Option<f64>,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            hidden_units: 50,
            layers: 2,
            dropout: 0.2,
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            gradient_clip: Some(5.0),
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_gradient_clip(mut self, clip: Option<f64>) -> Self {
        self.gradient_clip = clip;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: &str| Err(ModelError::InvalidConfig(msg.to_string()));
        if self.lookback == 0 {
            return invalid("lookback must be at least 1");
        }
        if self.hidden_units == 0 || self.layers == 0 {
            return invalid("hidden_units and layers must be at least 1");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must lie in [0, 1)");
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return invalid("epochs and batch_size must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        if matches!(self.gradient_clip, Some(c) if !(c.is_finite() && c > 0.0)) {
            return invalid("gradient_clip must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_dropout_and_zero_sizes() {
        assert!(ModelConfig::default().with_dropout(1.0).validate().is_err());
        assert!(ModelConfig::default().with_lookback(0).validate().is_err());
        assert!(ModelConfig::default().with_batch_size(0).validate().is_err());
        assert!(ModelConfig::default().with_gradient_clip(Some(0.0)).validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ModelConfig = toml::from_str("epochs = 3\nseed = 7").unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.lookback, 60);
    }
}
