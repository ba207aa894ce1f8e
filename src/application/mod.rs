// Sequence construction, scaling and the recurrent classifier
pub mod ml;

// Load-once inference pipeline
pub mod prediction_service;

pub use prediction_service::{Prediction, PredictionService};
