use thiserror::Error;

/// Top-level error type for the medic workspace.
///
/// Subsystem crates define their own error types; this one covers the
/// concerns shared by every crate (configuration, I/O, serialization) and
/// the failures the binary reports at startup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MedicError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for MedicError {
    fn from(err: toml::de::Error) -> Self {
        MedicError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MedicError {
    fn from(err: toml::ser::Error) -> Self {
        MedicError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MedicError {
    fn from(err: serde_json::Error) -> Self {
        MedicError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for medic operations.
pub type Result<T> = std::result::Result<T, MedicError>;
