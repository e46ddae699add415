//! Semantic résumé to job-posting matching.
//!
//! Job descriptions are embedded once into a [`vector::VectorStore`] and
//! indexed by an IVF index with optional product quantization. A résumé is
//! embedded the same way and the closest postings are returned as ranked
//! [`MatchResult`]s by the [`MatchEngine`].

pub mod config;
pub mod display;
pub mod document;
pub mod error;
pub mod io;
pub mod matching;
pub mod storage;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use document::extract_text;
pub use error::{EngineError, EngineResult};
pub use matching::{EngineConfig, MatchEngine, MatchResult, PublishedIndex};
pub use storage::{
    BlobStore, FsBlobStore, IndexMetadata, InMemoryRecordStore, JobRecord, MemoryBlobStore,
    RecordStore, StorageError, StorageResult,
};
pub use vector::{
    EmbeddingGenerator, FastEmbedGenerator, IndexBuilder, IndexCodec, RecordId, SearchIndex,
    VectorDimension, VectorError, VectorStore,
};
