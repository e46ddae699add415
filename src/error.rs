//! Error types for the matching engine and CLI.
//!
//! Each layer has its own `thiserror` enum: [`VectorError`] for the index,
//! [`StorageError`] for persistence. [`EngineError`] wraps both for callers of
//! [`MatchEngine`](crate::matching::MatchEngine).

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;
use crate::vector::VectorError;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to read document '{path}': {source}")]
    DocumentRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Document '{path}' contains no text")]
    EmptyDocument { path: PathBuf },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("{0}")]
    General(String),
}

impl EngineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(e) => match e {
                VectorError::InsufficientData { .. } => "INSUFFICIENT_DATA",
                VectorError::NotTrained => "NOT_TRAINED",
                VectorError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
                VectorError::FormatVersion { .. } => "FORMAT_VERSION",
                VectorError::IndexNotFound { .. } => "INDEX_NOT_FOUND",
                VectorError::InvalidFormat(_) | VectorError::MappingDrift { .. } => {
                    "INDEX_CORRUPTED"
                }
                VectorError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
                VectorError::Storage(_) => "STORAGE_ERROR",
                _ => "VECTOR_ERROR",
            },
            Self::Storage(_) => "STORAGE_ERROR",
            Self::DocumentRead { .. } => "DOCUMENT_READ_ERROR",
            Self::EmptyDocument { .. } => "EMPTY_DOCUMENT",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Whether the stored index can no longer be trusted and must be rebuilt.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Vector(
                VectorError::InvalidFormat(_)
                    | VectorError::MappingDrift { .. }
                    | VectorError::FormatVersion { .. }
            )
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::InsufficientData { .. }) => vec![
                "Run 'jobmatch embed <records.json>' before building the index",
                "Check that the corpus contains records with descriptions",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "The index was built with a different embedding model",
                "Run 'jobmatch embed' and 'jobmatch build' with the configured model",
            ],
            Self::Vector(VectorError::MappingDrift { .. } | VectorError::InvalidFormat(_)) => {
                vec![
                    "Run 'jobmatch build' to rebuild the index from the stored vectors",
                    "Check for disk errors or filesystem corruption",
                ]
            }
            Self::Vector(VectorError::FormatVersion { .. }) => {
                vec!["Run 'jobmatch build' to rebuild the index in the current format"]
            }
            Self::Vector(VectorError::EmbeddingFailed(_)) => vec![
                "Check the configured embedding model name",
                "The first run downloads the model and needs network access",
            ],
            Self::Storage(_) => vec![
                "Check disk space and permissions in the data directory",
            ],
            Self::DocumentRead { .. } => vec![
                "Check that the file exists and you have read permissions",
            ],
            Self::EmptyDocument { .. } => vec![
                "Only plain-text documents are supported; convert PDF or DOCX first",
            ],
            Self::Config { .. } => vec![
                "Run 'jobmatch init --force' to regenerate the settings file",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
