//! Résumé to job-posting matching on top of the vector index.

mod engine;
mod result;

pub use engine::{
    EngineConfig, MatchEngine, PublishedIndex, current_generation, ids_blob_name,
    index_blob_name, manifest_blob_name, metadata_blob_name, stored_metadata,
};
pub use result::{ELLIPSIS, MatchResult, preview};
