// Recurrent classifier and its training loop
pub mod lstm;

// Held-out evaluation metrics
pub mod metrics;

// Min-max normalization, persisted with the model
pub mod scaler;

// Per-company sliding-window construction
pub mod sequence;

// Offline training pipeline
pub mod trainer;

pub use lstm::LstmClassifier;
pub use scaler::MinMaxScaler;
pub use sequence::SequenceBuilder;
pub use trainer::{TrainReport, Trainer, TrainerConfig};
