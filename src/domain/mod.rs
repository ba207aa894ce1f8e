// Domain-specific error types
pub mod errors;

// Feature ordering contract shared by training and inference
pub mod feature_registry;

// Financial record types and validation
pub mod record;

// Repository traits
pub mod repositories;

/// Fixed window length used consistently in training and inference.
pub const TIME_STEPS: usize = 5;

/// Fixed classification threshold applied to the model probability.
pub const CLASSIFICATION_THRESHOLD: f64 = 0.5;
