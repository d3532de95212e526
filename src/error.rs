//! Error types for the document pipeline

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input (chunk parameters, filenames, archive limits)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Text extraction failed for a document
    #[error("Failed to extract '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// The embedding service could not produce vectors
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Persistent store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or over-limit upload archive
    #[error("Archive error: {0}")]
    Archive(String),

    /// Owning property does not exist
    #[error("Property not found: {0}")]
    PropertyNotFound(Uuid),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Upload job not found
    #[error("Upload job not found: {0}")]
    JobNotFound(Uuid),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an embedding-unavailable error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}
