use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array3, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::application::ml::lstm::LstmClassifier;
use crate::application::ml::metrics::{accuracy, r2_score};
use crate::application::ml::scaler::MinMaxScaler;
use crate::application::ml::sequence::{LabeledWindow, SequenceBuilder};
use crate::domain::errors::PipelineError;
use crate::domain::feature_registry::{NUM_FEATURES, feature_matrix};
use crate::domain::record::FinancialRecord;
use crate::domain::{CLASSIFICATION_THRESHOLD, TIME_STEPS};

/// Hyperparameters of the offline training job.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub time_steps: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub gradient_clip: f64,
    /// Held-out fraction for evaluation, stratified by label.
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            time_steps: TIME_STEPS,
            hidden_size: 32,
            epochs: 100,
            batch_size: 8,
            learning_rate: 0.05,
            gradient_clip: 5.0,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Held-out diagnostics of one training run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrainReport {
    pub windows: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub test_loss: f64,
    pub test_accuracy: f64,
    pub test_r2: f64,
    pub trained_at: DateTime<Utc>,
}

/// Runs the full offline pipeline: corpus -> scaler -> windows -> stratified
/// split -> LSTM fit -> held-out report.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        records: &[FinancialRecord],
    ) -> Result<(MinMaxScaler, LstmClassifier, TrainReport)> {
        if records.is_empty() {
            return Err(PipelineError::EmptyCorpus.into());
        }

        info!(rows = records.len(), "fitting scaler over training corpus");
        let matrix = feature_matrix(records);
        let scaler = MinMaxScaler::fit(&matrix)?;
        let scaled = scaler.transform(&matrix);

        let builder = SequenceBuilder::new(self.config.time_steps);
        let windows = builder.build_windows(records, &scaled)?;
        if windows.is_empty() {
            bail!(
                "no company has at least {} consecutive rows; nothing to train on",
                self.config.time_steps
            );
        }
        info!(windows = windows.len(), "built labeled windows");

        let (x, y) = stack_windows(&windows, self.config.time_steps);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (x_train, y_train, x_test, y_test) =
            stratified_split(&x, &y, self.config.test_fraction, &mut rng);
        if x_train.shape()[0] == 0 || x_test.shape()[0] == 0 {
            bail!(
                "corpus too small to hold out a test partition ({} windows total)",
                windows.len()
            );
        }

        info!(
            train = x_train.shape()[0],
            test = x_test.shape()[0],
            hidden = self.config.hidden_size,
            epochs = self.config.epochs,
            "training LSTM classifier"
        );
        let mut model = LstmClassifier::new(NUM_FEATURES, self.config.hidden_size, &mut rng);
        model.train(
            &x_train,
            &y_train,
            self.config.epochs,
            self.config.batch_size,
            self.config.learning_rate,
            self.config.gradient_clip,
        );

        let probs = model.predict_batch(&x_test);
        let report = TrainReport {
            windows: windows.len(),
            train_samples: x_train.shape()[0],
            test_samples: x_test.shape()[0],
            test_loss: model.evaluate_loss(&x_test, &y_test),
            test_accuracy: accuracy(&y_test, &probs, CLASSIFICATION_THRESHOLD),
            test_r2: r2_score(&y_test, &probs),
            trained_at: Utc::now(),
        };

        info!(
            loss = report.test_loss,
            accuracy = report.test_accuracy,
            r2 = report.test_r2,
            "held-out evaluation complete"
        );

        Ok((scaler, model, report))
    }
}

/// Stacks labeled windows into the `(samples, time_steps, features)` tensor
/// and its label vector.
fn stack_windows(windows: &[LabeledWindow], time_steps: usize) -> (Array3<f64>, Array1<f64>) {
    let mut x = Array3::zeros((windows.len(), time_steps, NUM_FEATURES));
    let mut y = Array1::zeros(windows.len());

    for (i, window) in windows.iter().enumerate() {
        x.slice_mut(s![i, .., ..]).assign(&window.features);
        y[i] = window.label;
    }

    (x, y)
}

/// Splits samples so that the label proportion is preserved in both
/// partitions. Indices are shuffled per class with the seeded rng, so the
/// split is reproducible for a fixed seed.
fn stratified_split(
    x: &Array3<f64>,
    y: &Array1<f64>,
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Array3<f64>, Array1<f64>, Array3<f64>, Array1<f64>) {
    let mut positives: Vec<usize> = Vec::new();
    let mut negatives: Vec<usize> = Vec::new();
    for (i, &label) in y.iter().enumerate() {
        if label > 0.5 {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }

    positives.shuffle(rng);
    negatives.shuffle(rng);

    let mut test_idx = Vec::new();
    let mut train_idx = Vec::new();
    for class in [positives, negatives] {
        let held_out = (class.len() as f64 * test_fraction).round() as usize;
        test_idx.extend_from_slice(&class[..held_out]);
        train_idx.extend_from_slice(&class[held_out..]);
    }

    (
        gather(x, &train_idx),
        gather_labels(y, &train_idx),
        gather(x, &test_idx),
        gather_labels(y, &test_idx),
    )
}

fn gather(x: &Array3<f64>, indices: &[usize]) -> Array3<f64> {
    let mut out = Array3::zeros((indices.len(), x.shape()[1], x.shape()[2]));
    for (row, &idx) in indices.iter().enumerate() {
        out.slice_mut(s![row, .., ..]).assign(&x.slice(s![idx, .., ..]));
    }
    out
}

fn gather_labels(y: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    Array1::from_iter(indices.iter().map(|&i| y[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_split_preserves_proportions() {
        // 30 positives, 70 negatives
        let n = 100;
        let x = Array3::zeros((n, TIME_STEPS, NUM_FEATURES));
        let y = Array1::from_shape_fn(n, |i| if i < 30 { 1.0 } else { 0.0 });

        let mut rng = StdRng::seed_from_u64(1);
        let (x_train, y_train, x_test, y_test) = stratified_split(&x, &y, 0.2, &mut rng);

        assert_eq!(x_train.shape()[0], 80);
        assert_eq!(x_test.shape()[0], 20);

        let train_pos = y_train.iter().filter(|&&l| l > 0.5).count();
        let test_pos = y_test.iter().filter(|&&l| l > 0.5).count();
        assert_eq!(train_pos, 24);
        assert_eq!(test_pos, 6);
    }

    #[test]
    fn test_stratified_split_is_seed_reproducible() {
        let n = 40;
        let x = Array3::from_shape_fn((n, TIME_STEPS, NUM_FEATURES), |(i, t, f)| {
            (i + t + f) as f64
        });
        let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);

        let mut rng_a = StdRng::seed_from_u64(9);
        let mut rng_b = StdRng::seed_from_u64(9);
        let (xa, ya, _, _) = stratified_split(&x, &y, 0.25, &mut rng_a);
        let (xb, yb, _, _) = stratified_split(&x, &y, 0.25, &mut rng_b);

        assert_eq!(xa, xb);
        assert_eq!(ya, yb);
    }

    fn synthetic_corpus() -> Vec<FinancialRecord> {
        // 8 companies x 10 years. "Winner" companies grow, the rest stagnate.
        let mut records = Vec::new();
        for c in 0..8 {
            let winner = c % 2 == 0;
            for (step, year) in (2013..=2022).enumerate() {
                let growth = if winner {
                    1.0 + step as f64 * 0.5
                } else {
                    1.0 + step as f64 * 0.01
                };
                records.push(FinancialRecord {
                    year,
                    company: format!("company-{c}"),
                    asset: 100.0 * growth,
                    debt: 40.0 / growth,
                    capital: 60.0 * growth,
                    income: 50.0 * growth,
                    cost: 30.0,
                    profit: 20.0 * growth,
                    net_income: 15.0 * growth,
                    investment: 10.0 * growth,
                    unicorn: Some(winner),
                });
            }
        }
        records
    }

    #[test]
    fn test_trainer_end_to_end_on_synthetic_corpus() {
        let config = TrainerConfig {
            hidden_size: 8,
            epochs: 30,
            ..TrainerConfig::default()
        };
        let records = synthetic_corpus();

        let (scaler, model, report) = Trainer::new(config).run(&records).unwrap();

        // 8 companies x (10 - 5 + 1) windows
        assert_eq!(report.windows, 48);
        assert_eq!(report.train_samples + report.test_samples, 48);
        assert!(report.test_loss.is_finite());
        assert!((0.0..=1.0).contains(&report.test_accuracy));
        assert_eq!(scaler.num_columns(), NUM_FEATURES);
        assert_eq!(model.input_size(), NUM_FEATURES);
    }

    #[test]
    fn test_trainer_rejects_empty_corpus() {
        let err = Trainer::new(TrainerConfig::default()).run(&[]).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_trainer_rejects_corpus_with_only_short_companies() {
        let records: Vec<FinancialRecord> = synthetic_corpus()
            .into_iter()
            .filter(|r| r.year >= 2020)
            .collect();

        let err = Trainer::new(TrainerConfig::default()).run(&records).unwrap_err();
        assert!(err.to_string().contains("nothing to train on"));
    }
}
