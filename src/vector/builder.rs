//! Two-phase index construction: train, then add.
//!
//! ```text
//! IndexBuilder::new ──train──► trained ──add*──► finish ──► BuiltIndex
//! ```
//!
//! `add` before `train` fails with [`VectorError::NotTrained`]. Each `add`
//! batch is validated in full before anything is appended, so a rejected
//! batch leaves the builder unchanged.

use std::sync::Arc;

use rayon::prelude::*;

use crate::vector::id_map::IdMap;
use crate::vector::index::{DEFAULT_NPROBE, PostingList, SearchIndex};
use crate::vector::quantizer::{ClusteringQuantizer, QuantizerConfig, TrainedQuantizer};
use crate::vector::types::{ClusterId, Position, RecordId, VectorError};

/// Largest position handed out; `u32::MAX` is the invalid-slot sentinel.
const MAX_ENTRIES: usize = u32::MAX as usize;

/// A finished index together with its position→record side table.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: SearchIndex,
    pub ids: IdMap,
}

/// Accumulates vectors into posting lists.
#[derive(Debug)]
pub struct IndexBuilder {
    quantizer: ClusteringQuantizer,
    trained: Option<Arc<TrainedQuantizer>>,
    lists: Vec<PostingList>,
    ids: Vec<RecordId>,
    nprobe: usize,
}

impl IndexBuilder {
    #[must_use]
    pub fn new(config: QuantizerConfig) -> Self {
        Self {
            quantizer: ClusteringQuantizer::new(config),
            trained: None,
            lists: Vec::new(),
            ids: Vec::new(),
            nprobe: DEFAULT_NPROBE,
        }
    }

    /// Default `nprobe` stored in the finished index.
    #[must_use]
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe.max(1);
        self
    }

    /// Trains the quantizer on `vectors`.
    ///
    /// Discards anything added so far; positions restart at zero.
    pub fn train(&mut self, vectors: &[&[f32]]) -> Result<Arc<TrainedQuantizer>, VectorError> {
        let trained = Arc::new(self.quantizer.train(vectors)?);
        self.lists = vec![PostingList::default(); trained.cluster_count()];
        self.ids.clear();
        self.trained = Some(Arc::clone(&trained));
        Ok(trained)
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Vectors added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Appends a batch; `vectors[i]` gets the next position and maps to `ids[i]`.
    ///
    /// # Errors
    /// - [`VectorError::NotTrained`] before [`train`](Self::train)
    /// - [`VectorError::BatchLengthMismatch`] when the slices differ in length
    /// - [`VectorError::DimensionMismatch`] when any vector has the wrong length
    /// - [`VectorError::CapacityExceeded`] when positions would run out
    pub fn add(&mut self, vectors: &[&[f32]], ids: &[RecordId]) -> Result<(), VectorError> {
        let trained = self.trained.clone().ok_or(VectorError::NotTrained)?;

        if vectors.len() != ids.len() {
            return Err(VectorError::BatchLengthMismatch {
                vectors: vectors.len(),
                ids: ids.len(),
            });
        }
        let dimension = trained.dimension();
        for vector in vectors {
            dimension.validate_vector(vector)?;
        }
        if self.ids.len() + vectors.len() > MAX_ENTRIES {
            return Err(VectorError::CapacityExceeded { max: MAX_ENTRIES });
        }

        let assignments: Vec<ClusterId> = vectors.par_iter().map(|v| trained.assign(v)).collect();

        match trained.codebook() {
            None => {
                for ((vector, cluster), offset) in vectors.iter().zip(&assignments).zip(0..) {
                    let position = self.next_position(offset);
                    self.lists[cluster.index()].push_flat(position, vector);
                }
            }
            Some(pq) => {
                let codes: Vec<Vec<u8>> = vectors
                    .par_iter()
                    .zip(assignments.par_iter())
                    .map(|(vector, &cluster)| pq.encode(&trained.residual(cluster, vector)))
                    .collect();
                for ((codes, cluster), offset) in codes.iter().zip(&assignments).zip(0..) {
                    let position = self.next_position(offset);
                    self.lists[cluster.index()].push_encoded(position, codes);
                }
            }
        }

        self.ids.extend_from_slice(ids);
        Ok(())
    }

    fn next_position(&self, offset: usize) -> Position {
        Position::new((self.ids.len() + offset) as u32)
    }

    /// Freezes the posting lists into a [`SearchIndex`] and its side table.
    pub fn finish(self) -> Result<BuiltIndex, VectorError> {
        let trained = self.trained.ok_or(VectorError::NotTrained)?;
        let index = SearchIndex::from_parts(trained, self.lists, self.nprobe)?;
        let ids = IdMap::new(self.ids, *index.fingerprint());
        Ok(BuiltIndex { index, ids })
    }

    /// Trains on every vector in `records`, adds them in order and finishes.
    pub fn build(
        config: QuantizerConfig,
        nprobe: usize,
        records: &[(RecordId, Vec<f32>)],
    ) -> Result<BuiltIndex, VectorError> {
        let vectors: Vec<&[f32]> = records.iter().map(|(_, v)| v.as_slice()).collect();
        let ids: Vec<RecordId> = records.iter().map(|(id, _)| *id).collect();

        let mut builder = Self::new(config).with_nprobe(nprobe);
        builder.train(&vectors)?;
        builder.add(&vectors, &ids)?;
        builder.finish()
    }
}
