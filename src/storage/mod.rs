//! Persistence collaborators: named blobs, job records and index metadata.

mod blob;
pub mod error;
mod metadata;
mod records;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{StorageError, StorageResult};
pub use metadata::IndexMetadata;
pub use records::{InMemoryRecordStore, JobRecord, RecordStore};
