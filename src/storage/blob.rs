//! Named blob persistence.
//!
//! Index generations and the manifest naming the current one are stored as
//! opaque blobs keyed by name. Writes are upserts: a write replaces whatever was stored
//! under that name.

use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tempfile::NamedTempFile;

use crate::storage::error::{StorageError, StorageResult};

/// Blob persistence collaborator.
pub trait BlobStore: Send + Sync {
    /// Returns the blob stored under `name`, or `None` if there is none.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `name`, replacing any previous blob.
    fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Deletes the blob stored under `name`. Missing blobs are not an error.
    fn remove(&self, name: &str) -> StorageResult<()>;
}

fn validate_name(name: &str) -> StorageResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else if name.starts_with('.') {
        "name starts with a dot"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidBlobName {
        name: name.to_string(),
        reason,
    })
}

/// One file per blob inside a directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader never observes a partially written blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path_for(name)?;
        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        tracing::debug!("Wrote blob {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local blob store, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_name(name)?;
        Ok(self.blobs.get(name).map(|blob| blob.value().clone()))
    }

    fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        validate_name(name)?;
        self.blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        validate_name(name)?;
        self.blobs.remove(name);
        Ok(())
    }
}
