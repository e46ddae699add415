//! Job records and the record-store collaborator.
//!
//! The index only knows record ids. Titles, companies and descriptions are
//! fetched from a [`RecordStore`] when results are assembled.

use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::vector::RecordId;

/// A job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
}

/// Record lookup by id.
pub trait RecordStore: Send + Sync {
    fn fetch_by_id(&self, id: RecordId) -> Option<JobRecord>;

    /// Every record, ordered by id.
    fn all(&self) -> Vec<JobRecord>;
}

/// Concurrent in-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: DashMap<RecordId, JobRecord>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `records`; later duplicates replace earlier ones.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Loads a JSON array of job records.
    ///
    /// Duplicate ids are rejected: the corpus file is the source of truth and
    /// an ambiguous id cannot be resolved safely.
    pub fn load_json(path: &Path) -> StorageResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let records: Vec<JobRecord> = serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {e}", path.display()))
        })?;

        let store = Self::new();
        for record in records {
            let id = record.id;
            if store.records.insert(id, record).is_some() {
                return Err(StorageError::DuplicateRecord(id.get()));
            }
        }

        tracing::debug!("Loaded {} job records from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn insert(&self, record: JobRecord) {
        self.records.insert(record.id, record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn fetch_by_id(&self, id: RecordId) -> Option<JobRecord> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    fn all(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }
}
