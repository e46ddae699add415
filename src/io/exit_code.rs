//! Process exit codes for `jobmatch`.
//!
//! Scripts can tell "nothing matched" (3) apart from real failures, and an
//! index that must be rebuilt (7) apart from a transient I/O problem (5).

use crate::error::EngineError;
use crate::storage::StorageError;
use crate::vector::VectorError;

/// Exit status of a CLI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,

    /// Embedding model and stored vectors disagree on dimension
    BlockingError = 2,

    /// No index or no matches
    NotFound = 3,

    /// Unreadable résumé, corpus or data directory
    IoError = 5,
    ConfigError = 6,

    /// Index blob or side table unusable; rebuild required
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// `Success` when a match list has entries, `NotFound` when it is empty.
    pub fn from_matches<T>(matches: &[T]) -> Self {
        if matches.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Maps an engine error to a semantic exit code.
    pub fn from_error(error: &EngineError) -> Self {
        if error.is_corruption() {
            return ExitCode::IndexCorrupted;
        }
        match error {
            EngineError::Vector(VectorError::IndexNotFound { .. }) => ExitCode::NotFound,
            EngineError::Vector(VectorError::Storage(_))
            | EngineError::Storage(StorageError::Io(_))
            | EngineError::DocumentRead { .. } => ExitCode::IoError,
            EngineError::Config { .. } => ExitCode::ConfigError,
            EngineError::Vector(VectorError::DimensionMismatch { .. }) => ExitCode::BlockingError,
            _ => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError | ExitCode::IndexCorrupted)
    }
}
