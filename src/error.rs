use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient training data: matrix has no rows or no columns")]
    InsufficientData,

    #[error("model not trained, call train() first")]
    Untrained,

    #[error("feature schema mismatch: expected {expected} columns, got {got}")]
    SchemaMismatch { expected: usize, got: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("model decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

pub type Result<T> = std::result::Result<T, DetectError>;
