use thiserror::Error;

/// Errors raised by a single detector run.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("invalid series '{name}': {reason}")]
    InvalidSeries { name: String, reason: String },
    #[error("detector failed: {0}")]
    Failed(String),
    #[error("detector panicked: {0}")]
    Panicked(String),
}
