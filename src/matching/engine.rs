//! Build and query orchestration.
//!
//! [`MatchEngine`] owns its collaborators (embedder, record store, blob store)
//! and one published index. Builds run under a single-writer lock and are
//! published by swapping an `Arc`; readers clone the current `Arc` and never
//! see a partially built index.
//!
//! Every build is stored as a numbered generation of three blobs (index, side
//! table, metadata). A small manifest blob names the current generation and is
//! written last, so a build that fails part way leaves the stored index of the
//! previous generation loadable.

use std::sync::Arc;

use indicatif::ProgressBar;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::matching::result::MatchResult;
use crate::storage::{BlobStore, IndexMetadata, JobRecord, RecordStore, StorageError};
use crate::vector::{
    BuiltIndex, DEFAULT_CHUNK_SIZE, DEFAULT_MODEL, DEFAULT_NPROBE, EmbeddingGenerator, IdMap,
    IndexBuilder, IndexCodec, QuantizerConfig, RecordId, SearchIndex, VectorError, VectorStore,
    embed_long_text,
};

/// Engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Name the index blobs are stored under
    pub index_name: String,
    /// Recorded in the index metadata
    pub model_name: String,
    /// Default clusters probed per query
    pub nprobe: usize,
    pub quantizer: QuantizerConfig,
    /// Characters per chunk for long-text embedding
    pub chunk_size: usize,
    /// Characters of description kept in each result
    pub preview_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_name: "job_matching_index".to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            nprobe: DEFAULT_NPROBE,
            quantizer: QuantizerConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            preview_chars: 300,
        }
    }
}

/// Blob naming the current generation of `name`.
#[must_use]
pub fn manifest_blob_name(name: &str) -> String {
    format!("{name}.manifest.json")
}

/// Blob holding the encoded index of one generation.
#[must_use]
pub fn index_blob_name(name: &str, generation: u64) -> String {
    format!("{name}.{generation}.index")
}

/// Blob holding the position side table of one generation.
#[must_use]
pub fn ids_blob_name(name: &str, generation: u64) -> String {
    format!("{name}.{generation}.ids")
}

/// Blob holding the JSON metadata of one generation.
#[must_use]
pub fn metadata_blob_name(name: &str, generation: u64) -> String {
    format!("{name}.{generation}.meta.json")
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    generation: u64,
}

/// Generation named by the manifest of `name`; `None` if nothing has been
/// published under that name.
///
/// # Errors
/// [`VectorError::InvalidFormat`] when the manifest cannot be parsed.
pub fn current_generation(blobs: &dyn BlobStore, name: &str) -> EngineResult<Option<u64>> {
    let Some(bytes) = blobs.read(&manifest_blob_name(name))? else {
        return Ok(None);
    };
    let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
        VectorError::InvalidFormat(format!("unreadable manifest for index '{name}': {e}"))
    })?;
    Ok(Some(manifest.generation))
}

/// Metadata of the stored index `name`, read without decoding the index.
///
/// # Errors
/// [`VectorError::InvalidFormat`] when the manifest names a generation whose
/// metadata blob is missing or unreadable.
pub fn stored_metadata(blobs: &dyn BlobStore, name: &str) -> EngineResult<Option<IndexMetadata>> {
    let Some(generation) = current_generation(blobs, name)? else {
        return Ok(None);
    };
    let bytes = blobs
        .read(&metadata_blob_name(name, generation))?
        .ok_or_else(|| {
            VectorError::InvalidFormat(format!(
                "metadata of index '{name}' generation {generation} is missing"
            ))
        })?;
    Ok(Some(IndexMetadata::from_json(&bytes)?))
}

/// An index that is being served, with its side table and metadata.
#[derive(Debug)]
pub struct PublishedIndex {
    pub index: SearchIndex,
    pub ids: IdMap,
    pub metadata: IndexMetadata,
    /// Stored generation the index was written to or loaded from
    pub generation: u64,
}

/// Orchestrates index builds and résumé queries.
pub struct MatchEngine {
    embedder: Arc<dyn EmbeddingGenerator>,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: EngineConfig,
    published: RwLock<Option<Arc<PublishedIndex>>>,
    /// Held by anything that publishes: builds and loads
    build_lock: Mutex<()>,
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("config", &self.config)
            .field("published", &self.published.read().is_some())
            .finish()
    }
}

impl MatchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingGenerator>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            embedder,
            records,
            blobs,
            config,
            published: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The index currently being served, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<PublishedIndex>> {
        self.published.read().clone()
    }

    /// Builds a new index from `vectors`, persists it and publishes it.
    ///
    /// # Errors
    /// Any build or persistence error. The previously published index keeps
    /// serving and its stored generation stays current; an empty `vectors`
    /// is [`VectorError::InsufficientData`].
    pub fn rebuild(&self, vectors: &[(RecordId, Vec<f32>)]) -> EngineResult<Arc<PublishedIndex>> {
        let _guard = self.build_lock.lock();

        tracing::info!(
            "Building index '{}' from {} vectors",
            self.config.index_name,
            vectors.len()
        );
        let built = IndexBuilder::build(self.config.quantizer, self.config.nprobe, vectors)?;
        let metadata =
            IndexMetadata::describe(&self.config.index_name, &self.config.model_name, &built.index);

        let name = &self.config.index_name;
        let stored = match current_generation(self.blobs.as_ref(), name) {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("Replacing unreadable manifest of index '{name}': {e}");
                None
            }
        };
        let published_generation = self.current().map(|p| p.generation);
        let generation = stored.max(published_generation).map_or(1, |g| g + 1);

        if let Err(e) = self.persist(generation, &built, &metadata) {
            self.discard_generation(generation);
            return Err(e);
        }

        let published = Arc::new(PublishedIndex {
            index: built.index,
            ids: built.ids,
            metadata,
            generation,
        });
        *self.published.write() = Some(Arc::clone(&published));

        if let Some(previous) = stored {
            self.discard_generation(previous);
        }

        tracing::info!(
            "Published index '{}' generation {}: {} vectors in {} clusters",
            name,
            generation,
            published.index.len(),
            published.index.cluster_count()
        );
        Ok(published)
    }

    /// Rebuilds from the latest vector of every record in `store`.
    pub fn rebuild_from_store(&self, store: &mut VectorStore) -> EngineResult<Arc<PublishedIndex>> {
        let vectors = store.read_all()?;
        self.rebuild(&vectors)
    }

    fn persist(
        &self,
        generation: u64,
        built: &BuiltIndex,
        metadata: &IndexMetadata,
    ) -> EngineResult<()> {
        let name = &self.config.index_name;
        self.blobs.write(
            &index_blob_name(name, generation),
            &IndexCodec::encode(&built.index),
        )?;
        self.blobs
            .write(&ids_blob_name(name, generation), &built.ids.to_bytes()?)?;
        self.blobs
            .write(&metadata_blob_name(name, generation), &metadata.to_json()?)?;

        let manifest = serde_json::to_vec(&Manifest { generation })
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize manifest: {e}")))?;
        self.blobs.write(&manifest_blob_name(name), &manifest)?;
        Ok(())
    }

    /// Best-effort removal of one generation's blobs.
    fn discard_generation(&self, generation: u64) {
        let name = &self.config.index_name;
        for blob in [
            index_blob_name(name, generation),
            ids_blob_name(name, generation),
            metadata_blob_name(name, generation),
        ] {
            if let Err(e) = self.blobs.remove(&blob) {
                tracing::warn!("Failed to remove stale blob '{blob}': {e}");
            }
        }
    }

    /// Loads and publishes the generation named by the stored manifest.
    ///
    /// Returns `Ok(false)` when nothing has been built under the configured
    /// name yet. Waits for a running build to finish first.
    ///
    /// # Errors
    /// [`VectorError::MappingDrift`] when the side table is missing or does
    /// not belong to the stored index; codec errors for unreadable blobs.
    pub fn load(&self) -> EngineResult<bool> {
        let _guard = self.build_lock.lock();

        let name = &self.config.index_name;
        let Some(generation) = current_generation(self.blobs.as_ref(), name)? else {
            tracing::debug!("No persisted index named '{name}'");
            return Ok(false);
        };

        let index_bytes = self
            .blobs
            .read(&index_blob_name(name, generation))?
            .ok_or_else(|| {
                VectorError::InvalidFormat(format!(
                    "index blob of generation {generation} is missing"
                ))
            })?;
        let index = IndexCodec::decode(&index_bytes)?;
        let ids_bytes = self
            .blobs
            .read(&ids_blob_name(name, generation))?
            .ok_or_else(|| VectorError::MappingDrift {
                reason: "side table blob is missing".to_string(),
            })?;
        let ids = IdMap::from_bytes(&ids_bytes)?;
        ids.verify_against(&index)?;

        let metadata = match self.blobs.read(&metadata_blob_name(name, generation))? {
            Some(bytes) => IndexMetadata::from_json(&bytes)?,
            None => {
                tracing::warn!("Index '{name}' has no metadata blob; describing it from the index");
                IndexMetadata::describe(name, &self.config.model_name, &index)
            }
        };

        tracing::info!(
            "Loaded index '{}' generation {}: {} vectors, dimension {}, {} clusters, built by {}",
            name,
            generation,
            metadata.vector_count,
            metadata.dimension,
            metadata.cluster_count,
            metadata.model
        );

        *self.published.write() = Some(Arc::new(PublishedIndex {
            index,
            ids,
            metadata,
            generation,
        }));
        Ok(true)
    }

    /// Embeds `text` and returns the `top_k` best matching records.
    ///
    /// Returns an empty list when no index has been published.
    pub fn match_text(&self, text: &str, top_k: usize) -> EngineResult<Vec<MatchResult>> {
        self.match_text_with_nprobe(text, top_k, None)
    }

    /// [`match_text`](Self::match_text) with an explicit `nprobe`.
    pub fn match_text_with_nprobe(
        &self,
        text: &str,
        top_k: usize,
        nprobe: Option<usize>,
    ) -> EngineResult<Vec<MatchResult>> {
        let Some(published) = self.current() else {
            tracing::debug!("No index published; returning no matches");
            return Ok(Vec::new());
        };

        let query = embed_long_text(self.embedder.as_ref(), text, self.config.chunk_size)?;
        let nprobe = nprobe.unwrap_or_else(|| published.index.default_nprobe());
        self.search_published(&published, &query, top_k, nprobe)
    }

    /// Returns the `top_k` best matching records for an embedding.
    pub fn match_vector(&self, query: &[f32], top_k: usize) -> EngineResult<Vec<MatchResult>> {
        match self.current() {
            Some(published) => {
                let nprobe = published.index.default_nprobe();
                self.search_published(&published, query, top_k, nprobe)
            }
            None => Ok(Vec::new()),
        }
    }

    /// [`match_vector`](Self::match_vector) with an explicit `nprobe`.
    pub fn match_vector_with_nprobe(
        &self,
        query: &[f32],
        top_k: usize,
        nprobe: usize,
    ) -> EngineResult<Vec<MatchResult>> {
        match self.current() {
            Some(published) => self.search_published(&published, query, top_k, nprobe),
            None => Ok(Vec::new()),
        }
    }

    fn search_published(
        &self,
        published: &PublishedIndex,
        query: &[f32],
        top_k: usize,
        nprobe: usize,
    ) -> EngineResult<Vec<MatchResult>> {
        let neighbors = published.index.search(query, top_k, nprobe)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in &neighbors {
            let Some(record_id) = published.ids.resolve(neighbor.position) else {
                tracing::warn!(
                    "Skipping position {} with no side-table entry",
                    neighbor.position.get()
                );
                continue;
            };
            let Some(record) = self.records.fetch_by_id(record_id) else {
                tracing::warn!("Skipping record {record_id}: not found in the record store");
                continue;
            };
            results.push(MatchResult::assemble(
                record,
                neighbor,
                self.config.preview_chars,
            ));
        }

        Ok(results)
    }

    /// Embeds every record with a non-blank description and appends the
    /// vectors to `store`.
    ///
    /// Returns the number of records embedded. Nothing is written if any
    /// embedding fails.
    pub fn embed_records(
        &self,
        records: &[JobRecord],
        store: &mut VectorStore,
        progress: Option<&ProgressBar>,
    ) -> EngineResult<usize> {
        let mut embedded: Vec<(RecordId, Vec<f32>)> = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            if record.description.trim().is_empty() {
                skipped += 1;
            } else {
                let vector = embed_long_text(
                    self.embedder.as_ref(),
                    &record.description,
                    self.config.chunk_size,
                )?;
                embedded.push((record.id, vector));
            }
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        if skipped > 0 {
            tracing::info!("Skipped {skipped} records with empty descriptions");
        }

        let batch: Vec<(RecordId, &[f32])> = embedded
            .iter()
            .map(|(id, vector)| (*id, vector.as_slice()))
            .collect();
        store.append(&batch)?;

        tracing::info!("Embedded {} records into {}", batch.len(), store.path().display());
        Ok(batch.len())
    }
}
