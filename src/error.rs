//! Error types for the export pipeline

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, paginating, assembling or saving
#[derive(Error, Debug)]
pub enum Error {
    /// Rasterizing the region failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Building the paginated document failed
    #[error("Document assembly failed: {0}")]
    AssemblyError(String),

    /// Persisting the finished document failed
    #[error("Failed to save document: {0}")]
    SaveError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error while preloading images
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::CaptureError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

#[cfg(feature = "fetch")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}
