use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("insufficient data: {rows} usable rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("model not trained")]
    ModelNotTrained,

    #[error("malformed reading: {0}")]
    MalformedReading(String),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("feature vector contains non-finite values")]
    NonFiniteFeatures,

    #[error("model persistence failed for {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("training/forecast in progress")]
    Busy,
}

pub type Result<T> = std::result::Result<T, ForecastError>;
