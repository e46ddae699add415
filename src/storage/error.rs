use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid blob name '{name}': {reason}")]
    InvalidBlobName { name: String, reason: &'static str },

    #[error("Duplicate record id {0} in corpus")]
    DuplicateRecord(u64),
}

pub type StorageResult<T> = Result<T, StorageError>;
