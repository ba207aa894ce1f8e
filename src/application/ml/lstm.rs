use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Array3, Axis, s};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::PipelineError;

/// Single LSTM cell: input, forget, cell-candidate and output gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,

    // input gate
    w_ii: Array2<f64>,
    w_hi: Array2<f64>,
    b_i: Array1<f64>,

    // forget gate
    w_if: Array2<f64>,
    w_hf: Array2<f64>,
    b_f: Array1<f64>,

    // cell candidate
    w_ig: Array2<f64>,
    w_hg: Array2<f64>,
    b_g: Array1<f64>,

    // output gate
    w_io: Array2<f64>,
    w_ho: Array2<f64>,
    b_o: Array1<f64>,
}

/// Everything the backward pass needs about one forward step.
#[derive(Debug, Clone)]
struct StepState {
    x: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    h: Array1<f64>,
    tanh_c: Array1<f64>,
}

impl LstmCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let mut init = |rows: usize, cols: usize| {
            Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
        };

        Self {
            input_size,
            hidden_size,
            w_ii: init(hidden_size, input_size),
            w_hi: init(hidden_size, hidden_size),
            b_i: Array1::zeros(hidden_size),
            w_if: init(hidden_size, input_size),
            w_hf: init(hidden_size, hidden_size),
            // Forget bias starts at 1 so early training retains state
            b_f: Array1::from_elem(hidden_size, 1.0),
            w_ig: init(hidden_size, input_size),
            w_hg: init(hidden_size, hidden_size),
            b_g: Array1::zeros(hidden_size),
            w_io: init(hidden_size, input_size),
            w_ho: init(hidden_size, hidden_size),
            b_o: Array1::zeros(hidden_size),
        }
    }

    /// One time step: returns the gate activations and the new (h, c).
    fn step(&self, x: &Array1<f64>, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> StepState {
        let i = sigmoid(&(self.w_ii.dot(x) + self.w_hi.dot(h_prev) + &self.b_i));
        let f = sigmoid(&(self.w_if.dot(x) + self.w_hf.dot(h_prev) + &self.b_f));
        let g = tanh(&(self.w_ig.dot(x) + self.w_hg.dot(h_prev) + &self.b_g));
        let o = sigmoid(&(self.w_io.dot(x) + self.w_ho.dot(h_prev) + &self.b_o));

        let c = &f * c_prev + &i * &g;
        let tanh_c = tanh(&c);
        let h = &o * &tanh_c;

        StepState {
            x: x.clone(),
            i,
            f,
            g,
            o,
            c,
            h,
            tanh_c,
        }
    }
}

/// Accumulated gradients for one mini-batch, mirroring the parameters.
struct Gradients {
    w_ii: Array2<f64>,
    w_hi: Array2<f64>,
    b_i: Array1<f64>,
    w_if: Array2<f64>,
    w_hf: Array2<f64>,
    b_f: Array1<f64>,
    w_ig: Array2<f64>,
    w_hg: Array2<f64>,
    b_g: Array1<f64>,
    w_io: Array2<f64>,
    w_ho: Array2<f64>,
    b_o: Array1<f64>,
    w_out: Array1<f64>,
    b_out: f64,
}

impl Gradients {
    fn zeros(input_size: usize, hidden_size: usize) -> Self {
        Self {
            w_ii: Array2::zeros((hidden_size, input_size)),
            w_hi: Array2::zeros((hidden_size, hidden_size)),
            b_i: Array1::zeros(hidden_size),
            w_if: Array2::zeros((hidden_size, input_size)),
            w_hf: Array2::zeros((hidden_size, hidden_size)),
            b_f: Array1::zeros(hidden_size),
            w_ig: Array2::zeros((hidden_size, input_size)),
            w_hg: Array2::zeros((hidden_size, hidden_size)),
            b_g: Array1::zeros(hidden_size),
            w_io: Array2::zeros((hidden_size, input_size)),
            w_ho: Array2::zeros((hidden_size, hidden_size)),
            b_o: Array1::zeros(hidden_size),
            w_out: Array1::zeros(hidden_size),
            b_out: 0.0,
        }
    }

    fn squared_norm(&self) -> f64 {
        let mats = [
            &self.w_ii, &self.w_hi, &self.w_if, &self.w_hf, &self.w_ig, &self.w_hg, &self.w_io,
            &self.w_ho,
        ];
        let vecs = [&self.b_i, &self.b_f, &self.b_g, &self.b_o, &self.w_out];

        let mut total = self.b_out * self.b_out;
        for m in mats {
            total += m.iter().map(|v| v * v).sum::<f64>();
        }
        for v in vecs {
            total += v.iter().map(|x| x * x).sum::<f64>();
        }
        total
    }

    fn scale(&mut self, factor: f64) {
        for m in [
            &mut self.w_ii,
            &mut self.w_hi,
            &mut self.w_if,
            &mut self.w_hf,
            &mut self.w_ig,
            &mut self.w_hg,
            &mut self.w_io,
            &mut self.w_ho,
        ] {
            m.mapv_inplace(|v| v * factor);
        }
        for v in [
            &mut self.b_i,
            &mut self.b_f,
            &mut self.b_g,
            &mut self.b_o,
            &mut self.w_out,
        ] {
            v.mapv_inplace(|x| x * factor);
        }
        self.b_out *= factor;
    }
}

/// Sequence-to-probability binary classifier: one LSTM layer feeding a dense
/// sigmoid head off the final hidden state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmClassifier {
    cell: LstmCell,
    w_out: Array1<f64>,
    b_out: f64,
    /// Average training loss per epoch, most recent run.
    #[serde(skip)]
    pub loss_history: Vec<f64>,
}

impl LstmClassifier {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        Self {
            cell: LstmCell::new(input_size, hidden_size, rng),
            w_out: Array1::from_shape_fn(hidden_size, |_| rng.random_range(-limit..limit)),
            b_out: 0.0,
            loss_history: Vec::new(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.cell.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.cell.hidden_size
    }

    /// Probability for one `(time_steps, input_size)` window.
    pub fn predict_window(&self, window: &Array2<f64>) -> f64 {
        let (prob, _) = self.forward_cached(window);
        prob
    }

    /// Probabilities for a `(samples, time_steps, input_size)` batch.
    pub fn predict_batch(&self, x: &Array3<f64>) -> Array1<f64> {
        let n = x.shape()[0];
        let mut probs = Array1::zeros(n);
        for b in 0..n {
            probs[b] = self.predict_window(&x.slice(s![b, .., ..]).to_owned());
        }
        probs
    }

    fn forward_cached(&self, window: &Array2<f64>) -> (f64, Vec<StepState>) {
        let mut h = Array1::zeros(self.cell.hidden_size);
        let mut c = Array1::zeros(self.cell.hidden_size);
        let mut states = Vec::with_capacity(window.nrows());

        for t in 0..window.nrows() {
            let x = window.row(t).to_owned();
            let state = self.cell.step(&x, &h, &c);
            h = state.h.clone();
            c = state.c.clone();
            states.push(state);
        }

        let z = self.w_out.dot(&h) + self.b_out;
        (sigmoid_scalar(z), states)
    }

    /// Backpropagation through time for one sample; gradients accumulate
    /// into `grads`. With the sigmoid head and binary cross-entropy the
    /// output delta collapses to `prob - label`.
    fn backward(&self, states: &[StepState], prob: f64, label: f64, grads: &mut Gradients) {
        let hidden = self.cell.hidden_size;
        let last_h = &states[states.len() - 1].h;

        let dz = prob - label;
        grads.w_out = &grads.w_out + &(last_h * dz);
        grads.b_out += dz;

        let mut dh: Array1<f64> = &self.w_out * dz;
        let mut dc: Array1<f64> = Array1::zeros(hidden);

        for t in (0..states.len()).rev() {
            let st = &states[t];
            let (h_prev, c_prev) = if t > 0 {
                (states[t - 1].h.clone(), states[t - 1].c.clone())
            } else {
                (Array1::zeros(hidden), Array1::zeros(hidden))
            };

            let d_o = &dh * &st.tanh_c * &st.o * &st.o.mapv(|v| 1.0 - v);
            dc = dc + &dh * &st.o * &st.tanh_c.mapv(|v| 1.0 - v * v);

            let d_f = &dc * &c_prev * &st.f * &st.f.mapv(|v| 1.0 - v);
            let d_i = &dc * &st.g * &st.i * &st.i.mapv(|v| 1.0 - v);
            let d_g = &dc * &st.i * &st.g.mapv(|v| 1.0 - v * v);

            grads.w_ii = &grads.w_ii + &outer(&d_i, &st.x);
            grads.w_hi = &grads.w_hi + &outer(&d_i, &h_prev);
            grads.b_i = &grads.b_i + &d_i;

            grads.w_if = &grads.w_if + &outer(&d_f, &st.x);
            grads.w_hf = &grads.w_hf + &outer(&d_f, &h_prev);
            grads.b_f = &grads.b_f + &d_f;

            grads.w_ig = &grads.w_ig + &outer(&d_g, &st.x);
            grads.w_hg = &grads.w_hg + &outer(&d_g, &h_prev);
            grads.b_g = &grads.b_g + &d_g;

            grads.w_io = &grads.w_io + &outer(&d_o, &st.x);
            grads.w_ho = &grads.w_ho + &outer(&d_o, &h_prev);
            grads.b_o = &grads.b_o + &d_o;

            dh = self.cell.w_hi.t().dot(&d_i)
                + self.cell.w_hf.t().dot(&d_f)
                + self.cell.w_hg.t().dot(&d_g)
                + self.cell.w_ho.t().dot(&d_o);
            dc = &dc * &st.f;
        }
    }

    fn apply(&mut self, grads: &Gradients, learning_rate: f64) {
        let cell = &mut self.cell;
        cell.w_ii = &cell.w_ii - &(&grads.w_ii * learning_rate);
        cell.w_hi = &cell.w_hi - &(&grads.w_hi * learning_rate);
        cell.b_i = &cell.b_i - &(&grads.b_i * learning_rate);
        cell.w_if = &cell.w_if - &(&grads.w_if * learning_rate);
        cell.w_hf = &cell.w_hf - &(&grads.w_hf * learning_rate);
        cell.b_f = &cell.b_f - &(&grads.b_f * learning_rate);
        cell.w_ig = &cell.w_ig - &(&grads.w_ig * learning_rate);
        cell.w_hg = &cell.w_hg - &(&grads.w_hg * learning_rate);
        cell.b_g = &cell.b_g - &(&grads.b_g * learning_rate);
        cell.w_io = &cell.w_io - &(&grads.w_io * learning_rate);
        cell.w_ho = &cell.w_ho - &(&grads.w_ho * learning_rate);
        cell.b_o = &cell.b_o - &(&grads.b_o * learning_rate);
        self.w_out = &self.w_out - &(&grads.w_out * learning_rate);
        self.b_out -= grads.b_out * learning_rate;
    }

    /// Trains with mini-batch gradient descent on binary cross-entropy.
    ///
    /// Batches are contiguous passes over the training order; gradients are
    /// averaged per batch and clipped by global norm before the update.
    pub fn train(
        &mut self,
        x_train: &Array3<f64>,
        y_train: &Array1<f64>,
        epochs: usize,
        batch_size: usize,
        learning_rate: f64,
        gradient_clip: f64,
    ) {
        let n_samples = x_train.shape()[0];
        let batch_size = batch_size.clamp(1, n_samples.max(1));

        self.loss_history.clear();

        for epoch in 0..epochs {
            let mut epoch_loss = 0.0;
            let mut n_batches = 0;

            for batch_start in (0..n_samples).step_by(batch_size) {
                let batch_end = (batch_start + batch_size).min(n_samples);
                let mut grads = Gradients::zeros(self.cell.input_size, self.cell.hidden_size);
                let mut batch_loss = 0.0;

                for b in batch_start..batch_end {
                    let window = x_train.slice(s![b, .., ..]).to_owned();
                    let label = y_train[b];

                    let (prob, states) = self.forward_cached(&window);
                    batch_loss += bce_sample(prob, label);
                    self.backward(&states, prob, label, &mut grads);
                }

                let batch_len = (batch_end - batch_start) as f64;
                grads.scale(1.0 / batch_len);

                let norm = grads.squared_norm().sqrt();
                if norm > gradient_clip && norm > 0.0 {
                    grads.scale(gradient_clip / norm);
                }

                self.apply(&grads, learning_rate);

                epoch_loss += batch_loss / batch_len;
                n_batches += 1;
            }

            let avg_loss = epoch_loss / n_batches.max(1) as f64;
            self.loss_history.push(avg_loss);
            debug!(epoch, loss = avg_loss, "epoch complete");
        }
    }

    /// Average binary cross-entropy over a batch.
    pub fn evaluate_loss(&self, x: &Array3<f64>, y: &Array1<f64>) -> f64 {
        let probs = self.predict_batch(x);
        probs
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| bce_sample(p, t))
            .sum::<f64>()
            / y.len().max(1) as f64
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self).context("Failed to serialize model")?;
        std::fs::write(path.as_ref(), encoded)
            .with_context(|| format!("Failed to write model to {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| PipelineError::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        bincode::deserialize(&bytes).map_err(|e| PipelineError::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let col = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    col.dot(&row)
}

fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(sigmoid_scalar)
}

fn sigmoid_scalar(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn tanh(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| v.tanh())
}

fn bce_sample(prob: f64, label: f64) -> f64 {
    let p = prob.clamp(1e-7, 1.0 - 1e-7);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_cell_step_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let cell = LstmCell::new(9, 16, &mut rng);

        let x = Array1::zeros(9);
        let h = Array1::zeros(16);
        let c = Array1::zeros(16);
        let state = cell.step(&x, &h, &c);

        assert_eq!(state.h.len(), 16);
        assert_eq!(state.c.len(), 16);
    }

    #[test]
    fn test_forward_outputs_probability() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = LstmClassifier::new(9, 16, &mut rng);

        let window = Array2::from_elem((5, 9), 0.5);
        let prob = model.predict_window(&window);
        assert!((0.0..=1.0).contains(&prob));
    }

    #[test]
    fn test_predict_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = LstmClassifier::new(9, 8, &mut rng);

        let window = Array2::from_shape_fn((5, 9), |(t, f)| (t * 9 + f) as f64 / 45.0);
        assert_eq!(model.predict_window(&window), model.predict_window(&window));
    }

    #[test]
    fn test_training_reduces_loss_on_separable_data() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut model = LstmClassifier::new(3, 8, &mut rng);

        // Positive class lives near 1.0, negative near 0.0
        let n = 40;
        let mut x = Array3::zeros((n, 5, 3));
        let mut y = Array1::zeros(n);
        for s in 0..n {
            let positive = s % 2 == 0;
            let base = if positive { 0.9 } else { 0.1 };
            for t in 0..5 {
                for f in 0..3 {
                    x[[s, t, f]] = base + 0.01 * (t as f64) - 0.005 * (f as f64);
                }
            }
            y[s] = if positive { 1.0 } else { 0.0 };
        }

        let initial = model.evaluate_loss(&x, &y);
        model.train(&x, &y, 60, 8, 0.1, 5.0);
        let trained = model.evaluate_loss(&x, &y);

        assert!(
            trained < initial,
            "loss did not improve: {initial} -> {trained}"
        );
        assert_eq!(model.loss_history.len(), 60);
    }

    #[test]
    fn test_save_load_round_trip_preserves_predictions() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = LstmClassifier::new(4, 6, &mut rng);

        let path = std::env::temp_dir().join(format!("lstm_rt_{}.bin", std::process::id()));
        model.save(&path).unwrap();
        let restored = LstmClassifier::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let window = Array2::from_elem((5, 4), 0.3);
        assert_eq!(
            model.predict_window(&window),
            restored.predict_window(&window)
        );
    }

    #[test]
    fn test_load_missing_file_is_reported() {
        let err = LstmClassifier::load("/nonexistent/model.bin").unwrap_err();
        assert!(err.to_string().contains("model.bin"));
    }
}
