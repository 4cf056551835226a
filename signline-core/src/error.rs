use thiserror::Error;

/// All errors produced by signline-core.
#[derive(Debug, Error)]
pub enum SignlineError {
    #[error("feature vector has {actual} values, expected {expected}")]
    InvalidFeatureLength { expected: usize, actual: usize },

    #[error("feature vector contains a non-finite value at index {index}")]
    NonFiniteFeature { index: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("classifier returned label outside its class list: {0}")]
    UnknownLabel(String),

    #[error("classifier returned confidence {confidence} for `{label}`, expected a value in [0, 1]")]
    InvalidConfidence { label: String, confidence: f32 },

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("malformed model file: {0}")]
    MalformedModel(String),

    #[error("malformed frame record on line {line}: {message}")]
    MalformedFrame { line: usize, message: String },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SignlineError {
    /// Whether this error describes input or classifier output that was
    /// rejected, as opposed to a failure of the classifier or the host.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            SignlineError::InvalidFeatureLength { .. }
                | SignlineError::NonFiniteFeature { .. }
                | SignlineError::InvalidConfidence { .. }
                | SignlineError::UnknownLabel(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SignlineError>;
