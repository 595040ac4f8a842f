//! Error types for ppfcrate

use thiserror::Error;

/// Main error type for ppfcrate operations.
///
/// `Load`, `NormalEstimation` and `Sampling` are fatal for the fragment being
/// processed but never for its siblings.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Normal estimation error: {0}")]
    NormalEstimation(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether this error came from reading inputs
    pub fn is_load(&self) -> bool {
        matches!(self, Error::Load(_) | Error::Io(_))
    }
}

/// Result type alias for ppfcrate operations
pub type Result<T> = std::result::Result<T, Error>;
