use std::path::Path;

use tracing::info;

use crate::application::ml::{LstmClassifier, MinMaxScaler, SequenceBuilder};
use crate::domain::errors::PipelineError;
use crate::domain::feature_registry::{NUM_FEATURES, feature_matrix};
use crate::domain::record::FinancialRecord;
use crate::domain::{CLASSIFICATION_THRESHOLD, TIME_STEPS};

/// Outcome of scoring one entity.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub probability: f64,
    pub is_unicorn: bool,
}

impl Prediction {
    /// Probability at the fixed display precision used on the wire.
    pub fn rounded_probability(&self) -> f64 {
        (self.probability * 100.0).round() / 100.0
    }
}

/// Inference pipeline: the persisted scaler and model, loaded once and held
/// immutably for the life of the process.
///
/// Shared behind an `Arc` by concurrent request handlers; nothing here
/// mutates after construction, so no locking is needed. The only lifecycle
/// is unloaded -> loaded -> serving.
#[derive(Debug)]
pub struct PredictionService {
    scaler: MinMaxScaler,
    model: LstmClassifier,
    builder: SequenceBuilder,
}

impl PredictionService {
    pub fn new(scaler: MinMaxScaler, model: LstmClassifier) -> Result<Self, PipelineError> {
        if scaler.num_columns() != NUM_FEATURES || model.input_size() != NUM_FEATURES {
            return Err(PipelineError::ArtifactLoad {
                path: "<memory>".to_string(),
                reason: format!(
                    "artifact shape mismatch: scaler has {} columns, model expects {}, contract says {}",
                    scaler.num_columns(),
                    model.input_size(),
                    NUM_FEATURES
                ),
            });
        }

        Ok(Self {
            scaler,
            model,
            builder: SequenceBuilder::new(TIME_STEPS),
        })
    }

    /// Loads both artifacts from disk. Called once at startup.
    pub fn load<P: AsRef<Path>>(scaler_path: P, model_path: P) -> Result<Self, PipelineError> {
        let scaler = MinMaxScaler::load(scaler_path.as_ref())?;
        let model = LstmClassifier::load(model_path.as_ref())?;
        info!(
            scaler = %scaler_path.as_ref().display(),
            model = %model_path.as_ref().display(),
            "loaded inference artifacts"
        );
        Self::new(scaler, model)
    }

    /// Scores the entity behind `rows`: most recent `time_steps` rows,
    /// ascending by year, scaled with the training-time transform, one
    /// forward pass. Pure and deterministic for fixed artifacts and input.
    pub fn predict(&self, rows: &[FinancialRecord]) -> Result<Prediction, PipelineError> {
        let window = self.builder.latest_rows(rows)?;
        let scaled = self.scaler.transform(&feature_matrix(&window));
        let probability = self.model.predict_window(&scaled);

        Ok(Prediction {
            probability,
            is_unicorn: probability > CLASSIFICATION_THRESHOLD,
        })
    }
}
