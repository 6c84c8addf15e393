//! A single LSTM layer with forward pass and backpropagation through time.
//!
//! Gate weights are packed into one matrix of shape `(4H, I + H)` applied to
//! the concatenation `[x_t, h_{t-1}]`; rows are ordered input, forget,
//! candidate, output.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct LstmLayer {
    input_size: usize,
    hidden: usize,
    pub(crate) w: Array2<f64>,
    pub(crate) b: Array1<f64>,
}

/// Everything one time step needs for its backward pass.
#[derive(Debug, Clone)]
pub struct StepCache {
    z: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c_prev: Array1<f64>,
    c: Array1<f64>,
    tanh_c: Array1<f64>,
    pub h: Array1<f64>,
}

/// Gradients for one layer.
#[derive(Debug, Clone)]
pub struct LayerGrads {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

impl LayerGrads {
    pub fn zeros_like(layer: &LstmLayer) -> Self {
        Self {
            w: Array2::zeros(layer.w.dim()),
            b: Array1::zeros(layer.b.len()),
        }
    }

    pub fn add(&mut self, other: &LayerGrads) {
        self.w += &other.w;
        self.b += &other.b;
    }

    pub fn scale(&mut self, k: f64) {
        self.w *= k;
        self.b *= k;
    }

    pub fn sum_squares(&self) -> f64 {
        self.w.iter().chain(self.b.iter()).map(|v| v * v).sum()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LstmLayer {
    /// Uniform(±1/√H) weights, zero biases except the forget gate at 1.
    pub fn new<R: Rng>(input_size: usize, hidden: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let w = Array2::from_shape_fn((4 * hidden, input_size + hidden), |_| rng.gen_range(-limit..limit));
        let mut b = Array1::zeros(4 * hidden);
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            input_size,
            hidden,
            w,
            b,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// One time step from `(h_prev, c_prev)`.
    pub fn step(&self, x: ArrayView1<'_, f64>, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> StepCache {
        let h = self.hidden;
        let mut z = Array1::zeros(self.input_size + h);
        z.slice_mut(s![..self.input_size]).assign(&x);
        z.slice_mut(s![self.input_size..]).assign(h_prev);

        let a = self.w.dot(&z) + &self.b;
        let i = a.slice(s![..h]).mapv(sigmoid);
        let f = a.slice(s![h..2 * h]).mapv(sigmoid);
        let g = a.slice(s![2 * h..3 * h]).mapv(f64::tanh);
        let o = a.slice(s![3 * h..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f64::tanh);
        let h_next = &o * &tanh_c;

        StepCache {
            z,
            i,
            f,
            g,
            o,
            c_prev: c_prev.clone(),
            c,
            tanh_c,
            h: h_next,
        }
    }

    /// Run a whole sequence (one row per time step) from zero state.
    pub fn forward(&self, xs: &Array2<f64>) -> Vec<StepCache> {
        let mut h = Array1::zeros(self.hidden);
        let mut c = Array1::zeros(self.hidden);
        let mut steps = Vec::with_capacity(xs.nrows());
        for x in xs.axis_iter(Axis(0)) {
            let step = self.step(x, &h, &c);
            c = step.c.clone();
            h = step.h.clone();
            steps.push(step);
        }
        steps
    }

    /// Backpropagation through time. `dh[t]` is the loss gradient arriving at
    /// the layer's output `h_t` from above. Returns parameter gradients and
    /// the gradient with respect to each input row.
    pub fn backward(&self, steps: &[StepCache], dh: &Array2<f64>) -> (LayerGrads, Array2<f64>) {
        let hidden = self.hidden;
        let mut grads = LayerGrads::zeros_like(self);
        let mut dx = Array2::zeros((steps.len(), self.input_size));
        let mut dh_next = Array1::<f64>::zeros(hidden);
        let mut dc_next = Array1::<f64>::zeros(hidden);

        for (t, step) in steps.iter().enumerate().rev() {
            let dh_t = &dh.row(t) + &dh_next;
            let d_o = &dh_t * &step.tanh_c;
            let dc = &dh_t * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let di = &dc * &step.g;
            let df = &dc * &step.c_prev;
            let dg = &dc * &step.i;

            let mut da = Array1::zeros(4 * hidden);
            da.slice_mut(s![..hidden]).assign(&(&di * &step.i.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![hidden..2 * hidden]).assign(&(&df * &step.f.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![2 * hidden..3 * hidden]).assign(&(&dg * &step.g.mapv(|v| 1.0 - v * v)));
            da.slice_mut(s![3 * hidden..]).assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            let da_col = da.view().insert_axis(Axis(1));
            let z_row = step.z.view().insert_axis(Axis(0));
            grads.w += &da_col.dot(&z_row);
            grads.b += &da;

            let dz = self.w.t().dot(&da);
            dx.row_mut(t).assign(&dz.slice(s![..self.input_size]));
            dh_next = dz.slice(s![self.input_size..]).to_owned();
            dc_next = &dc * &step.f;
        }

        (grads, dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer() -> LstmLayer {
        LstmLayer::new(1, 3, &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn shapes_and_forget_bias() {
        let l = layer();
        assert_eq!(l.w.dim(), (12, 4));
        assert_eq!(l.b.slice(s![3..6]).to_vec(), vec![1.0; 3]);
        assert_eq!(l.b[0], 0.0);
    }

    #[test]
    fn hidden_state_is_bounded() {
        let xs = Array2::from_shape_vec((5, 1), vec![0.1, 0.5, 0.9, 0.2, 0.7]).unwrap();
        let steps = layer().forward(&xs);
        assert_eq!(steps.len(), 5);
        assert!(steps.iter().all(|s| s.h.iter().all(|v| v.abs() < 1.0)));
    }

    /// Loss = sum of the last hidden state; compare one analytic weight
    /// gradient against a central finite difference.
    #[test]
    fn backward_matches_finite_difference() {
        let xs = Array2::from_shape_vec((4, 1), vec![0.3, -0.2, 0.8, 0.1]).unwrap();
        let base = layer();
        let loss = |l: &LstmLayer| l.forward(&xs).last().unwrap().h.sum();

        let steps = base.forward(&xs);
        let mut dh = Array2::zeros((4, 3));
        dh.row_mut(3).fill(1.0);
        let (grads, _) = base.backward(&steps, &dh);

        let eps = 1e-6;
        for &(r, c) in &[(0, 0), (4, 2), (8, 1), (11, 3)] {
            let mut plus = base.clone();
            plus.w[[r, c]] += eps;
            let mut minus = base.clone();
            minus.w[[r, c]] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - grads.w[[r, c]]).abs() < 1e-6, "w[{r},{c}]: {numeric} vs {}", grads.w[[r, c]]);
        }
    }
}
