//! Metadata sidecar describing a published index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::vector::SearchIndex;

/// Metadata about a built index, stored as JSON next to the index blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of the metadata format
    pub version: u32,

    /// Index name the blobs are stored under
    pub name: String,

    pub dimension: usize,

    /// Live entries in the index
    pub vector_count: usize,

    pub cluster_count: usize,

    /// Whether posting lists hold PQ codes instead of full vectors
    pub quantized: bool,

    #[serde(default)]
    pub subvectors: usize,

    #[serde(default)]
    pub bits: u8,

    /// Default clusters probed per query
    pub nprobe: usize,

    /// Embedding model that produced the vectors
    pub model: String,

    /// Unix timestamp of the build
    pub created_at: u64,
}

impl IndexMetadata {
    const CURRENT_VERSION: u32 = 1;

    /// Describes `index`, stamped with the current time.
    pub fn describe(name: &str, model: &str, index: &SearchIndex) -> Self {
        let (subvectors, bits) = index
            .quantizer()
            .codebook()
            .map(|pq| (pq.num_subvectors(), pq.bits()))
            .unwrap_or((0, 0));

        Self {
            version: Self::CURRENT_VERSION,
            name: name.to_string(),
            dimension: index.dimension().get(),
            vector_count: index.len(),
            cluster_count: index.cluster_count(),
            quantized: index.quantizer().is_quantized(),
            subvectors,
            bits,
            nprobe: index.default_nprobe(),
            model: model.to_string(),
            created_at: Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Build time as a UTC date, if the timestamp is representable.
    #[must_use]
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at as i64, 0)
    }

    pub fn to_json(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize metadata: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> StorageResult<Self> {
        let metadata: Self = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::Metadata(format!("Failed to parse metadata: {e}")))?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(StorageError::Metadata(format!(
                "Metadata version {} is newer than supported version {}",
                metadata.version,
                Self::CURRENT_VERSION
            )));
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{IndexBuilder, Quantization, QuantizerConfig, RecordId};

    fn index() -> SearchIndex {
        let records: Vec<(RecordId, Vec<f32>)> = (0..20)
            .map(|i| (RecordId::new(i), vec![i as f32, (i % 3) as f32]))
            .collect();
        let config = QuantizerConfig {
            quantization: Quantization::Flat,
            ..Default::default()
        };
        IndexBuilder::build(config, 5, &records).unwrap().index
    }

    #[test]
    fn test_describe_and_json() {
        let metadata = IndexMetadata::describe("jobs", "AllMiniLML6V2", &index());
        assert_eq!(metadata.dimension, 2);
        assert_eq!(metadata.vector_count, 20);
        assert_eq!(metadata.cluster_count, 4);
        assert!(!metadata.quantized);
        assert_eq!(metadata.nprobe, 5);
        assert!(metadata.created_at_utc().is_some());

        let parsed = IndexMetadata::from_json(&metadata.to_json().unwrap()).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut metadata = IndexMetadata::describe("jobs", "m", &index());
        metadata.version = 99;
        let bytes = serde_json::to_vec(&metadata).unwrap();
        assert!(matches!(
            IndexMetadata::from_json(&bytes),
            Err(StorageError::Metadata(_))
        ));
    }
}
