use thiserror::Error;

/// Errors surfaced by the prediction pipeline and the record store.
///
/// Every variant is caught at the HTTP boundary and converted into a
/// structured failure response; none of them should ever reach the caller
/// as a panic.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not enough history: {available} rows available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("missing field: {field}")]
    MissingField { field: &'static str },

    #[error("record store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to load artifact {path}: {reason}")]
    ArtifactLoad { path: String, reason: String },

    #[error("model artifacts not loaded; run the train job first")]
    ModelUnavailable,

    #[error("training corpus is empty after dropping incomplete rows")]
    EmptyCorpus,

    #[error("invalid upload: {reason}")]
    InvalidUpload { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_formatting() {
        let err = PipelineError::InsufficientData {
            available: 3,
            required: 5,
        };

        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let err = PipelineError::MissingField { field: "profit" };
        assert!(err.to_string().contains("profit"));
    }
}
