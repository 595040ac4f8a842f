//! Error types for I/O operations

use ppfcrate_core::Error;
use thiserror::Error;

/// Errors that can occur during I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Parse error in {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Write error for {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IoError {
    pub(crate) fn parse(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        IoError::ParseError {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        IoError::WriteError {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Every failure to read or write an input surfaces as a load error
impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Error::Load(err.to_string())
    }
}

/// Open `path` for reading, reporting a missing file as [`IoError::FileNotFound`]
pub(crate) fn open_file(path: &std::path::Path) -> std::result::Result<std::fs::File, IoError> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IoError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => IoError::Io(e),
    })
}

/// Create `path` for writing
pub(crate) fn create_file(path: &std::path::Path) -> std::result::Result<std::fs::File, IoError> {
    std::fs::File::create(path).map_err(|e| IoError::write(path, e))
}
