//! Product quantization codebook.
//!
//! A vector of dimension `d` is split into `m` contiguous sub-vectors of
//! `d / m` components. Each sub-space gets its own codebook of `2^bits`
//! centroids trained with K-means, and a vector is stored as `m` one-byte
//! codes. Query distances use asymmetric distance computation: the query
//! stays exact and is compared against a per-query lookup table.

use crate::vector::clustering::{KMeansConfig, kmeans_clustering};
use crate::vector::types::{VectorError, l2_distance_squared};
use rayon::prelude::*;

/// Codes are stored in one byte each.
pub const MAX_BITS: u8 = 8;

/// A trained product quantizer.
///
/// Centroids are stored flattened as `[m][2^bits][d / m]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    dimension: usize,
    num_subvectors: usize,
    bits: u8,
    subvector_dim: usize,
    centroids: Vec<f32>,
}

impl ProductQuantizer {
    /// Checks that `(dimension, num_subvectors, bits)` describe a valid layout.
    pub fn validate(dimension: usize, num_subvectors: usize, bits: u8) -> Result<(), VectorError> {
        if num_subvectors == 0 || dimension % num_subvectors != 0 {
            return Err(VectorError::InvalidQuantization {
                reason: format!(
                    "{num_subvectors} subvectors do not evenly divide dimension {dimension}"
                ),
            });
        }
        if bits == 0 || bits > MAX_BITS {
            return Err(VectorError::InvalidQuantization {
                reason: format!("{bits} bits per code is outside 1..={MAX_BITS}"),
            });
        }
        Ok(())
    }

    /// Trains one codebook per sub-space.
    ///
    /// Needs at least `2^bits` training vectors.
    pub fn train(
        vectors: &[&[f32]],
        num_subvectors: usize,
        bits: u8,
        config: &KMeansConfig,
    ) -> Result<Self, VectorError> {
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        Self::validate(dimension, num_subvectors, bits)?;

        let codebook_size = 1usize << bits;
        if vectors.len() < codebook_size {
            return Err(VectorError::InsufficientData { got: vectors.len() });
        }

        let subvector_dim = dimension / num_subvectors;
        let per_subspace: Vec<Vec<Vec<f32>>> = (0..num_subvectors)
            .into_par_iter()
            .map(|m| {
                let start = m * subvector_dim;
                let sub: Vec<&[f32]> = vectors
                    .iter()
                    .map(|v| &v[start..start + subvector_dim])
                    .collect();
                let sub_config = KMeansConfig {
                    seed: config.seed.wrapping_add(m as u64 + 1),
                    ..*config
                };
                kmeans_clustering(&sub, codebook_size, &sub_config)
                    .map(|result| result.centroids)
                    .map_err(|e| VectorError::ClusteringFailed(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let centroids = per_subspace.into_iter().flatten().flatten().collect();

        Ok(Self {
            dimension,
            num_subvectors,
            bits,
            subvector_dim,
            centroids,
        })
    }

    /// Rebuilds a quantizer from its serialized parts.
    pub fn from_parts(
        dimension: usize,
        num_subvectors: usize,
        bits: u8,
        centroids: Vec<f32>,
    ) -> Result<Self, VectorError> {
        Self::validate(dimension, num_subvectors, bits)?;
        let expected = dimension << bits;
        if centroids.len() != expected {
            return Err(VectorError::InvalidFormat(format!(
                "codebook holds {} values, expected {expected}",
                centroids.len()
            )));
        }
        Ok(Self {
            dimension,
            num_subvectors,
            bits,
            subvector_dim: dimension / num_subvectors,
            centroids,
        })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn num_subvectors(&self) -> usize {
        self.num_subvectors
    }

    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    #[must_use]
    pub fn codebook_size(&self) -> usize {
        1usize << self.bits
    }

    /// Flattened centroid table, `[m][2^bits][d / m]`.
    #[must_use]
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Centroid `code` of sub-space `m`.
    #[inline]
    pub fn centroid(&self, m: usize, code: usize) -> &[f32] {
        let offset = (m * self.codebook_size() + code) * self.subvector_dim;
        &self.centroids[offset..offset + self.subvector_dim]
    }

    /// Appends the `m` codes of `vector` to `out`.
    pub fn encode_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        for m in 0..self.num_subvectors {
            let start = m * self.subvector_dim;
            let sub = &vector[start..start + self.subvector_dim];

            let mut best_code = 0;
            let mut best_distance = f32::INFINITY;
            for code in 0..self.codebook_size() {
                let distance = l2_distance_squared(sub, self.centroid(m, code));
                if distance < best_distance {
                    best_distance = distance;
                    best_code = code;
                }
            }
            out.push(best_code as u8);
        }
    }

    #[must_use]
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(self.num_subvectors);
        self.encode_into(vector, &mut codes);
        codes
    }

    /// Reconstructs the approximate vector for `codes`.
    #[must_use]
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        for (m, &code) in codes.iter().enumerate() {
            vector.extend_from_slice(self.centroid(m, code as usize));
        }
        vector
    }

    /// Precomputes distances from each query sub-vector to every centroid.
    #[must_use]
    pub fn distance_table(&self, query: &[f32]) -> DistanceTable {
        let codebook_size = self.codebook_size();
        let mut table = Vec::with_capacity(self.num_subvectors * codebook_size);
        for m in 0..self.num_subvectors {
            let start = m * self.subvector_dim;
            let sub = &query[start..start + self.subvector_dim];
            for code in 0..codebook_size {
                table.push(l2_distance_squared(sub, self.centroid(m, code)));
            }
        }
        DistanceTable {
            codebook_size,
            table,
        }
    }
}

/// Per-query lookup table for asymmetric distance computation.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    codebook_size: usize,
    table: Vec<f32>,
}

impl DistanceTable {
    /// Approximate squared L2 distance between the query and an encoded vector.
    #[inline]
    pub fn distance(&self, codes: &[u8]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(m, &code)| self.table[m * self.codebook_size + code as usize])
            .sum()
    }
}
