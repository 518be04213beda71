//! Error types for the Gantry engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Runner provider errors
    #[error("Runner provider error: {0}")]
    Provider(String),

    #[error("No runner available for platform: {0}")]
    NoRunnerForPlatform(String),

    // Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    // Reporting errors
    #[error("Publish failed: {0}")]
    Publish(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
