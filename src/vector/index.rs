//! The queryable inverted-file index.
//!
//! A [`SearchIndex`] is immutable once built. Search never mutates it, so one
//! instance can serve any number of concurrent readers.
//!
//! # Approximation
//! Only the `nprobe` clusters whose centroids are nearest to the query are
//! scanned, and quantized entries are scored with table lookups instead of
//! exact arithmetic. Recall therefore depends on `nprobe`, the cluster count
//! and the quantization; even the true nearest neighbor can be missed.

use std::sync::Arc;

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::vector::quantizer::TrainedQuantizer;
use crate::vector::types::{
    ClusterId, Position, Score, VectorDimension, VectorError, l2_distance_squared,
};

/// Clusters probed per query unless the caller asks otherwise.
pub const DEFAULT_NPROBE: usize = 8;

/// SHA-256 over the posting-list layout, shared with the id side table.
pub type Fingerprint = [u8; 32];

/// Entries assigned to one cluster, in insertion order.
///
/// Flat indexes keep `dimension` floats per entry in `vectors`; quantized
/// indexes keep `subvectors` codes per entry in `codes`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostingList {
    positions: Vec<Position>,
    vectors: Vec<f32>,
    codes: Vec<u8>,
}

impl PostingList {
    pub(crate) fn from_parts(positions: Vec<Position>, vectors: Vec<f32>, codes: Vec<u8>) -> Self {
        Self {
            positions,
            vectors,
            codes,
        }
    }

    pub(crate) fn push_flat(&mut self, position: Position, vector: &[f32]) {
        self.positions.push(position);
        self.vectors.extend_from_slice(vector);
    }

    pub(crate) fn push_encoded(&mut self, position: Position, codes: &[u8]) {
        self.positions.push(position);
        self.codes.extend_from_slice(codes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Full-precision payload (flat indexes only).
    #[must_use]
    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// PQ code payload (quantized indexes only).
    #[must_use]
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position; resolve through the id side table.
    pub position: Position,
    /// Cluster the entry lives in.
    pub cluster: ClusterId,
    /// Squared L2 distance (approximate when quantized).
    pub distance: f32,
}

impl Neighbor {
    #[must_use]
    pub fn similarity(&self) -> Score {
        Score::from_distance(self.distance)
    }
}

/// Immutable IVF index: coarse centroids, optional PQ codebook and one
/// posting list per cluster.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    quantizer: Arc<TrainedQuantizer>,
    lists: Vec<PostingList>,
    nprobe: usize,
    fingerprint: Fingerprint,
    live_entries: usize,
}

impl SearchIndex {
    /// Assembles an index, checking every posting list against the quantizer.
    pub(crate) fn from_parts(
        quantizer: Arc<TrainedQuantizer>,
        lists: Vec<PostingList>,
        nprobe: usize,
    ) -> Result<Self, VectorError> {
        if lists.len() != quantizer.cluster_count() {
            return Err(VectorError::InvalidFormat(format!(
                "{} posting lists for {} clusters",
                lists.len(),
                quantizer.cluster_count()
            )));
        }

        let dimension = quantizer.dimension().get();
        let code_len = quantizer.codebook().map(|pq| pq.num_subvectors());
        for (cluster, list) in lists.iter().enumerate() {
            let consistent = match code_len {
                None => list.vectors.len() == list.len() * dimension && list.codes.is_empty(),
                Some(m) => list.codes.len() == list.len() * m && list.vectors.is_empty(),
            };
            if !consistent {
                return Err(VectorError::InvalidFormat(format!(
                    "posting list {cluster} payload does not match its {} entries",
                    list.len()
                )));
            }
        }

        let live_entries = lists
            .iter()
            .map(|l| l.positions.iter().filter(|p| p.is_valid()).count())
            .sum();
        let fingerprint = fingerprint_postings(&lists);

        Ok(Self {
            quantizer,
            lists,
            nprobe: nprobe.max(1),
            fingerprint,
            live_entries,
        })
    }

    /// Approximate k-nearest-neighbor search.
    ///
    /// # Algorithm
    /// 1. Rank centroids by distance to `query` and keep the `nprobe` nearest
    /// 2. Score every live entry of those clusters (exact for flat storage,
    ///    table lookups over residual codes for PQ)
    /// 3. Sort ascending by distance, ties by insertion position, keep `k`
    ///
    /// Returns fewer than `k` hits when the probed clusters hold fewer live
    /// entries. Slots marked [`Position::INVALID`] are never returned.
    ///
    /// # Errors
    /// [`VectorError::DimensionMismatch`] when `query` has the wrong length.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
    ) -> Result<Vec<Neighbor>, VectorError> {
        self.dimension().validate_vector(query)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let nprobe = nprobe.clamp(1, self.lists.len());
        let probed = self.quantizer.probe(query, nprobe);

        let mut candidates: Vec<Neighbor> = probed
            .par_iter()
            .flat_map_iter(|&cluster| self.score_list(cluster, query))
            .collect();

        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        candidates.truncate(k);

        Ok(candidates)
    }

    fn score_list(&self, cluster: ClusterId, query: &[f32]) -> Vec<Neighbor> {
        let list = &self.lists[cluster.index()];
        if list.is_empty() {
            return Vec::new();
        }

        match self.quantizer.codebook() {
            None => {
                let dimension = self.dimension().get();
                list.positions
                    .iter()
                    .zip(list.vectors.chunks_exact(dimension))
                    .filter(|(position, _)| position.is_valid())
                    .map(|(&position, vector)| Neighbor {
                        position,
                        cluster,
                        distance: l2_distance_squared(query, vector),
                    })
                    .collect()
            }
            Some(pq) => {
                let residual = self.quantizer.residual(cluster, query);
                let table = pq.distance_table(&residual);
                list.positions
                    .iter()
                    .zip(list.codes.chunks_exact(pq.num_subvectors()))
                    .filter(|(position, _)| position.is_valid())
                    .map(|(&position, codes)| Neighbor {
                        position,
                        cluster,
                        distance: table.distance(codes),
                    })
                    .collect()
            }
        }
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.quantizer.dimension()
    }

    #[must_use]
    pub fn default_nprobe(&self) -> usize {
        self.nprobe
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.lists.len()
    }

    /// Number of live (valid-position) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_entries == 0
    }

    #[must_use]
    pub fn quantizer(&self) -> &Arc<TrainedQuantizer> {
        &self.quantizer
    }

    #[must_use]
    pub fn lists(&self) -> &[PostingList] {
        &self.lists
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The cluster holding `position`, if any.
    #[must_use]
    pub fn cluster_of(&self, position: Position) -> Option<ClusterId> {
        self.lists
            .iter()
            .position(|list| list.positions.contains(&position))
            .map(|i| ClusterId::new(i as u32))
    }
}

/// Hashes cluster count, list lengths and positions in posting order.
pub(crate) fn fingerprint_postings(lists: &[PostingList]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((lists.len() as u64).to_le_bytes());
    for list in lists {
        hasher.update((list.positions.len() as u64).to_le_bytes());
        for position in &list.positions {
            hasher.update(position.to_bytes());
        }
    }
    hasher.finalize().into()
}
