//! Stacked LSTM regressor: fit on windows, predict one step ahead.
//!
//! Layout: `layers` LSTM layers of `hidden_units`, dropout after each, and a
//! single linear output unit. Every [`ForecastModel::fit`] call starts from a
//! freshly initialized network; there is no incremental training.
//!
//! Training is deterministic for a given seed. Per-sample gradients are
//! computed in parallel with rayon, collected in sample order and summed
//! sequentially, so thread scheduling never changes the result.

use super::config::ModelConfig;
use super::forecast::StepPredictor;
use super::lstm::{LayerGrads, LstmLayer, StepCache};
use super::optimizer::{Adam, Moments};
use super::window::Window;
use super::ModelError;
use ndarray::{Array1, Array2, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone)]
struct Network {
    layers: Vec<LstmLayer>,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
}

/// Inverted-dropout masks for one sample: per (step, unit) on every
/// sequence-returning layer, per unit on the last layer's final state.
#[derive(Debug, Clone)]
struct DropoutMasks {
    sequences: Vec<Array2<f64>>,
    last: Array1<f64>,
}

#[derive(Debug, Clone)]
struct Gradients {
    layers: Vec<LayerGrads>,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
}

impl Gradients {
    fn zeros_like(net: &Network) -> Self {
        Self {
            layers: net.layers.iter().map(LayerGrads::zeros_like).collect(),
            dense_w: Array1::zeros(net.dense_w.len()),
            dense_b: Array1::zeros(1),
        }
    }

    fn add(&mut self, other: &Gradients) {
        for (a, b) in self.layers.iter_mut().zip(&other.layers) {
            a.add(b);
        }
        self.dense_w += &other.dense_w;
        self.dense_b += &other.dense_b;
    }

    fn norm(&self) -> f64 {
        let dense: f64 = self.dense_w.iter().chain(self.dense_b.iter()).map(|v| v * v).sum();
        (self.layers.iter().map(LayerGrads::sum_squares).sum::<f64>() + dense).sqrt()
    }

    fn scale(&mut self, k: f64) {
        for g in &mut self.layers {
            g.scale(k);
        }
        self.dense_w *= k;
        self.dense_b *= k;
    }
}

struct AdamState {
    adam: Adam,
    layers: Vec<(Moments<Ix2>, Moments<Ix1>)>,
    dense_w: Moments<Ix1>,
    dense_b: Moments<Ix1>,
}

impl AdamState {
    fn new(net: &Network, learning_rate: f64) -> Self {
        Self {
            adam: Adam::new(learning_rate),
            layers: net
                .layers
                .iter()
                .map(|l| (Moments::zeros_like(&l.w), Moments::zeros_like(&l.b)))
                .collect(),
            dense_w: Moments::zeros_like(&net.dense_w),
            dense_b: Moments::zeros_like(&net.dense_b),
        }
    }

    fn apply(&mut self, net: &mut Network, grads: &Gradients) {
        self.adam.begin_step();
        for ((layer, g), (mw, mb)) in net.layers.iter_mut().zip(&grads.layers).zip(&mut self.layers) {
            self.adam.update(&mut layer.w, &g.w, mw);
            self.adam.update(&mut layer.b, &g.b, mb);
        }
        self.adam.update(&mut net.dense_w, &grads.dense_w, &mut self.dense_w);
        self.adam.update(&mut net.dense_b, &grads.dense_b, &mut self.dense_b);
    }
}

fn as_column(input: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((input.len(), 1), |(t, _)| input[t])
}

impl Network {
    fn init(config: &ModelConfig, rng: &mut StdRng) -> Self {
        let h = config.hidden_units;
        let layers = (0..config.layers)
            .map(|k| LstmLayer::new(if k == 0 { 1 } else { h }, h, rng))
            .collect();
        let limit = (6.0 / (h as f64 + 1.0)).sqrt();
        let dense_w = Array1::from_shape_fn(h, |_| rng.gen_range(-limit..limit));
        Self {
            layers,
            dense_w,
            dense_b: Array1::zeros(1),
        }
    }

    fn sample_masks(&self, steps: usize, dropout: f64, rng: &mut StdRng) -> DropoutMasks {
        let keep = 1.0 - dropout;
        let draw = |rng: &mut StdRng| if rng.gen::<f64>() < dropout { 0.0 } else { 1.0 / keep };
        let hidden = self.dense_w.len();
        let sequences = (1..self.layers.len())
            .map(|_| Array2::from_shape_fn((steps, hidden), |_| draw(rng)))
            .collect();
        let last = Array1::from_shape_fn(hidden, |_| draw(rng));
        DropoutMasks { sequences, last }
    }

    /// Inference pass, no dropout.
    fn predict(&self, input: &[f64]) -> f64 {
        let mut xs = as_column(input);
        let mut last_h = Array1::zeros(self.dense_w.len());
        for layer in &self.layers {
            let steps = layer.forward(&xs);
            xs = stack_hidden(&steps);
            if let Some(step) = steps.last() {
                last_h = step.h.clone();
            }
        }
        self.dense_w.dot(&last_h) + self.dense_b[0]
    }

    /// Forward and backward for one sample. `scale` multiplies the output
    /// gradient (2 / batch for a mean-squared loss). Returns the squared error.
    fn sample_gradients(&self, window: &Window, masks: &DropoutMasks, scale: f64) -> (f64, Gradients) {
        let mut traces: Vec<Vec<StepCache>> = Vec::with_capacity(self.layers.len());
        let mut xs = as_column(&window.input);
        for (k, layer) in self.layers.iter().enumerate() {
            let steps = layer.forward(&xs);
            xs = stack_hidden(&steps);
            if let Some(mask) = masks.sequences.get(k) {
                xs *= mask;
            }
            traces.push(steps);
        }

        let hidden = self.dense_w.len();
        let steps_len = window.input.len();
        let top = traces.last().and_then(|t| t.last()).map(|s| s.h.clone());
        let h_top = top.unwrap_or_else(|| Array1::zeros(hidden));
        let h_dropped = &h_top * &masks.last;
        let y_hat = self.dense_w.dot(&h_dropped) + self.dense_b[0];
        let err = y_hat - window.target;
        let dy = scale * err;

        let mut grads = Gradients::zeros_like(self);
        grads.dense_w = &h_dropped * dy;
        grads.dense_b[0] = dy;

        let mut dh = Array2::zeros((steps_len, hidden));
        dh.row_mut(steps_len - 1).assign(&(&self.dense_w * dy * &masks.last));

        for k in (0..self.layers.len()).rev() {
            let (layer_grads, dx) = self.layers[k].backward(&traces[k], &dh);
            grads.layers[k] = layer_grads;
            if k > 0 {
                dh = dx;
                if let Some(mask) = masks.sequences.get(k - 1) {
                    dh *= mask;
                }
            }
        }

        (err * err, grads)
    }
}

fn stack_hidden(steps: &[StepCache]) -> Array2<f64> {
    let hidden = steps.first().map(|s| s.h.len()).unwrap_or(0);
    let mut out = Array2::zeros((steps.len(), hidden));
    for (t, step) in steps.iter().enumerate() {
        out.row_mut(t).assign(&step.h);
    }
    out
}

/// Per-epoch mean training loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    pub samples: usize,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

#[derive(Debug, Clone)]
enum ModelState {
    Untrained,
    Trained(Network),
}

/// Recurrent next-value regressor over scaled closing prices.
#[derive(Debug, Clone)]
pub struct ForecastModel {
    config: ModelConfig,
    state: ModelState,
}

impl ForecastModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            config,
            state: ModelState::Untrained,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ModelState::Trained(_))
    }

    /// Train from scratch on `windows`. Any earlier training is discarded.
    pub fn fit(&mut self, windows: &[Window]) -> Result<TrainingReport, ModelError> {
        let cfg = &self.config;
        if windows.is_empty() {
            return Err(ModelError::EmptyTrainingSet {
                rows: 0,
                lookback: cfg.lookback,
            });
        }
        if let Some(w) = windows.iter().find(|w| w.input.len() != cfg.lookback) {
            return Err(ModelError::ShapeMismatch {
                expected: cfg.lookback,
                actual: w.input.len(),
            });
        }
        if windows
            .iter()
            .any(|w| !w.target.is_finite() || w.input.iter().any(|v| !v.is_finite()))
        {
            return Err(ModelError::NonFinite { stage: "training input" });
        }

        self.state = ModelState::Untrained;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut net = Network::init(cfg, &mut rng);
        let mut optimizer = AdamState::new(&net, cfg.learning_rate);
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut report = TrainingReport {
            epoch_losses: Vec::with_capacity(cfg.epochs),
            samples: windows.len(),
        };

        for epoch in 0..cfg.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(cfg.batch_size) {
                let masks: Vec<DropoutMasks> = batch
                    .iter()
                    .map(|_| net.sample_masks(cfg.lookback, cfg.dropout, &mut rng))
                    .collect();
                let scale = 2.0 / batch.len() as f64;
                let per_sample: Vec<(f64, Gradients)> = batch
                    .par_iter()
                    .zip(masks.par_iter())
                    .map(|(&idx, mask)| net.sample_gradients(&windows[idx], mask, scale))
                    .collect();

                let mut total = Gradients::zeros_like(&net);
                for (loss, g) in &per_sample {
                    epoch_loss += loss;
                    total.add(g);
                }
                if let Some(clip) = cfg.gradient_clip {
                    let norm = total.norm();
                    if norm > clip {
                        total.scale(clip / norm);
                    }
                }
                optimizer.apply(&mut net, &total);
            }

            let mean = epoch_loss / windows.len() as f64;
            if !mean.is_finite() {
                return Err(ModelError::NonFinite { stage: "training loss" });
            }
            tracing::debug!(epoch = epoch + 1, loss = mean, "epoch complete");
            report.epoch_losses.push(mean);
        }

        self.state = ModelState::Trained(net);
        Ok(report)
    }

    fn network(&self) -> Result<&Network, ModelError> {
        match &self.state {
            ModelState::Trained(net) => Ok(net),
            ModelState::Untrained => Err(ModelError::NotTrained),
        }
    }

    /// Next scaled value after `input` (length `lookback`).
    pub fn predict_one(&self, input: &[f64]) -> Result<f64, ModelError> {
        let net = self.network()?;
        if input.len() != self.config.lookback {
            return Err(ModelError::ShapeMismatch {
                expected: self.config.lookback,
                actual: input.len(),
            });
        }
        let y = net.predict(input);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ModelError::NonFinite { stage: "prediction" })
        }
    }

    /// In-sample reconstruction: one prediction per window, in window order.
    pub fn backfit(&self, windows: &[Window]) -> Result<Vec<f64>, ModelError> {
        self.network()?;
        windows.par_iter().map(|w| self.predict_one(&w.input)).collect()
    }
}

impl StepPredictor for ForecastModel {
    fn lookback(&self) -> usize {
        self.config.lookback
    }

    fn predict_next(&self, window: &[f64]) -> Result<f64, ModelError> {
        self.predict_one(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::window::build_windows;

    fn small() -> ModelConfig {
        ModelConfig::default()
            .with_lookback(8)
            .with_hidden_units(6)
            .with_epochs(3)
            .with_batch_size(8)
            .with_learning_rate(0.01)
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 0.5 + 0.4 * (i as f64 / 6.0).sin()).collect()
    }

    #[test]
    fn untrained_model_refuses_to_predict() {
        let model = ForecastModel::new(small()).unwrap();
        assert_eq!(model.predict_one(&[0.0; 8]), Err(ModelError::NotTrained));
        assert!(!model.is_trained());
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(ForecastModel::new(small().with_dropout(1.5)).is_err());
    }

    #[test]
    fn fit_then_predict() {
        let windows = build_windows(&wave(80), 8).unwrap();
        let mut model = ForecastModel::new(small()).unwrap();
        let report = model.fit(&windows).unwrap();
        assert_eq!(report.epoch_losses.len(), 3);
        assert_eq!(report.samples, 72);
        assert!(model.is_trained());

        let y = model.predict_one(&windows[0].input).unwrap();
        assert!(y.is_finite());
        assert_eq!(model.backfit(&windows).unwrap().len(), 72);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let windows = build_windows(&wave(60), 8).unwrap();
        let mut a = ForecastModel::new(small()).unwrap();
        let mut b = ForecastModel::new(small()).unwrap();
        let ra = a.fit(&windows).unwrap();
        let rb = b.fit(&windows).unwrap();
        assert_eq!(ra, rb);
        let input = &windows[5].input;
        assert_eq!(a.predict_one(input).unwrap(), b.predict_one(input).unwrap());
    }

    #[test]
    fn refit_reinitializes() {
        let windows = build_windows(&wave(60), 8).unwrap();
        let mut model = ForecastModel::new(small()).unwrap();
        let first = model.fit(&windows).unwrap();
        let second = model.fit(&windows).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn loss_decreases_on_a_learnable_signal() {
        let windows = build_windows(&wave(120), 8).unwrap();
        let cfg = small().with_epochs(15).with_dropout(0.0);
        let mut model = ForecastModel::new(cfg).unwrap();
        let report = model.fit(&windows).unwrap();
        let first = report.epoch_losses[0];
        let last = report.final_loss().unwrap();
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn wrong_window_length_is_a_shape_error() {
        let windows = build_windows(&wave(30), 5).unwrap();
        let mut model = ForecastModel::new(small()).unwrap();
        assert!(matches!(model.fit(&windows), Err(ModelError::ShapeMismatch { expected: 8, actual: 5 })));
    }

    #[test]
    fn nan_input_is_rejected() {
        let mut windows = build_windows(&wave(30), 8).unwrap();
        windows[3].target = f64::NAN;
        let mut model = ForecastModel::new(small()).unwrap();
        assert!(matches!(model.fit(&windows), Err(ModelError::NonFinite { .. })));
    }
}
