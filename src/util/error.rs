//! Error types for the generation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid or missing configuration (fatal before any sample is touched)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset name is not one of the supported datasets
    #[error("Unknown dataset '{name}', available: {available}")]
    UnknownDataset { name: String, available: String },

    /// Pose vector with a length other than 72 (or 66 before padding)
    #[error("Invalid pose length {0}: expected 72 or 66 values")]
    InvalidPoseLength(usize),

    /// Required field absent from a sample record
    #[error("Missing field '{field}' in {}", path.display())]
    MissingField { field: String, path: PathBuf },

    /// Field present but with an unusable shape or type
    #[error("Malformed field '{field}' in {}: {reason}", path.display())]
    MalformedField { field: String, path: PathBuf, reason: String },

    /// Vertex count does not match what an operation requires
    #[error("Vertex count mismatch: expected {expected}, got {actual}")]
    VertexCountMismatch { expected: usize, actual: usize },

    /// Point cache codec error
    #[error("Point cache error: {0}")]
    Cache(#[from] pc2::Error),

    /// Numpy archive could not be read
    #[error("Archive error in {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scene host rejected an operation
    #[error("Scene host error: {0}")]
    Host(String),

    /// Artifact export failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Processing aborted unexpectedly (e.g. a panic inside an attempt)
    #[error("Processing failed: {0}")]
    Processing(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a scene host error.
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Create a missing-field load error.
    pub fn missing(field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingField { field: field.into(), path: path.into() }
    }

    /// Create a malformed-field load error.
    pub fn malformed(field: impl Into<String>, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedField { field: field.into(), path: path.into(), reason: reason.into() }
    }

    /// Create an archive error.
    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive { path: path.into(), reason: reason.to_string() }
    }

    /// True for errors that must abort the run before sample work begins.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownDataset { .. })
    }

    /// Render the error with its full source chain, one cause per line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
