//! Approximate nearest-neighbor search over embedding vectors.
//!
//! # Architecture
//! The index is an inverted file (IVF): a K-means coarse quantizer partitions
//! the space into clusters and every vector is stored in the posting list of
//! its nearest centroid, either in full or as residual product-quantization
//! codes. A query scans only the `nprobe` clusters closest to it.
//!
//! Construction is two-phase ([`IndexBuilder::train`] then
//! [`IndexBuilder::add`]) and produces an immutable [`SearchIndex`] plus the
//! [`IdMap`] side table that resolves internal positions to record ids.
//! [`IndexCodec`] turns an index into a byte blob and back.

mod builder;
mod clustering;
mod codec;
mod embedding;
mod id_map;
mod index;
mod pq;
mod quantizer;
mod storage;
mod types;

pub use builder::{BuiltIndex, IndexBuilder};
pub use clustering::{
    ClusteringError, KMeansConfig, KMeansResult, MAX_CLUSTERS, MIN_CLUSTERS,
    MIN_POINTS_PER_CLUSTER, assign_to_nearest_centroid, cluster_count_for, kmeans_clustering,
};
pub use codec::{INDEX_FORMAT_VERSION, INDEX_MAGIC, IndexCodec};
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MODEL, EmbeddingGenerator, FastEmbedGenerator, embed_long_text,
    parse_embedding_model,
};
pub use id_map::{ID_MAP_VERSION, IdMap};
pub use index::{DEFAULT_NPROBE, Fingerprint, Neighbor, PostingList, SearchIndex};
pub use pq::{DistanceTable, ProductQuantizer};
pub use quantizer::{ClusteringQuantizer, Quantization, QuantizerConfig, TrainedQuantizer};
pub use storage::{VECTOR_FILE_NAME, VectorStore};
pub use types::{
    ClusterId, Position, RecordId, SIMILARITY_DISTANCE_CAP, Score, VectorDimension, VectorError,
    l2_distance_squared,
};
