//! Coarse quantizer training: cluster centroids plus an optional PQ codebook.
//!
//! [`ClusteringQuantizer::train`] is pure: it reads the training set and
//! returns an immutable [`TrainedQuantizer`]. Everything downstream (adding
//! vectors, searching, encoding the index) borrows that value.

use serde::{Deserialize, Serialize};

use crate::vector::clustering::{
    KMeansConfig, assign_to_nearest_centroid, cluster_count_for, kmeans_clustering,
    nearest_centroids,
};
use crate::vector::pq::ProductQuantizer;
use crate::vector::types::{ClusterId, VectorDimension, VectorError};

/// How posting-list vectors are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Quantization {
    /// Full-precision vectors, exact distances.
    Flat,
    /// Residual product quantization with `subvectors` one-byte codes.
    Product { subvectors: usize, bits: u8 },
}

impl Default for Quantization {
    fn default() -> Self {
        Quantization::Product {
            subvectors: 8,
            bits: 8,
        }
    }
}

/// Training parameters for [`ClusteringQuantizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizerConfig {
    pub quantization: Quantization,
    pub kmeans: KMeansConfig,
    /// Overrides the cluster-count heuristic when set.
    pub num_clusters: Option<usize>,
}

/// Trains coarse centroids and, optionally, a residual PQ codebook.
#[derive(Debug, Clone, Default)]
pub struct ClusteringQuantizer {
    config: QuantizerConfig,
}

impl ClusteringQuantizer {
    #[must_use]
    pub fn new(config: QuantizerConfig) -> Self {
        Self { config }
    }

    /// Fits the quantizer to `vectors`.
    ///
    /// # Errors
    /// - [`VectorError::InsufficientData`] when `vectors` is empty
    /// - [`VectorError::DimensionMismatch`] when vectors disagree on length
    /// - [`VectorError::InvalidQuantization`] when the PQ layout does not fit
    ///   the dimension
    pub fn train(&self, vectors: &[&[f32]]) -> Result<TrainedQuantizer, VectorError> {
        let Some(first) = vectors.first() else {
            return Err(VectorError::InsufficientData { got: 0 });
        };

        let dimension = VectorDimension::new(first.len())?;
        for vector in vectors {
            dimension.validate_vector(vector)?;
        }

        if let Quantization::Product { subvectors, bits } = self.config.quantization {
            ProductQuantizer::validate(dimension.get(), subvectors, bits)?;
        }

        let nominal = self
            .config
            .num_clusters
            .unwrap_or_else(|| cluster_count_for(vectors.len()));
        let k = nominal.min(vectors.len());
        if k < nominal {
            tracing::debug!(
                "Corpus of {} vectors is smaller than the nominal {} clusters; training {} clusters",
                vectors.len(),
                nominal,
                k
            );
        }

        let result = kmeans_clustering(vectors, k, &self.config.kmeans)
            .map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        let codebook = match self.config.quantization {
            Quantization::Flat => None,
            Quantization::Product { bits, .. } if vectors.len() < (1usize << bits) => {
                tracing::warn!(
                    "Product quantization with {} bits needs at least {} training vectors, got {}; storing full vectors",
                    bits,
                    1usize << bits,
                    vectors.len()
                );
                None
            }
            Quantization::Product { subvectors, bits } => {
                let residuals: Vec<Vec<f32>> = vectors
                    .iter()
                    .zip(&result.assignments)
                    .map(|(vector, cluster)| residual(vector, &result.centroids[cluster.index()]))
                    .collect();
                let residual_refs: Vec<&[f32]> = residuals.iter().map(|r| r.as_slice()).collect();
                Some(ProductQuantizer::train(
                    &residual_refs,
                    subvectors,
                    bits,
                    &self.config.kmeans,
                )?)
            }
        };

        tracing::info!(
            "Trained coarse quantizer: {} clusters over {} vectors in {} iterations (quantized: {})",
            result.centroids.len(),
            vectors.len(),
            result.iterations,
            codebook.is_some()
        );

        Ok(TrainedQuantizer {
            dimension,
            centroids: result.centroids,
            codebook,
        })
    }
}

/// The frozen output of training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedQuantizer {
    dimension: VectorDimension,
    centroids: Vec<Vec<f32>>,
    codebook: Option<ProductQuantizer>,
}

impl TrainedQuantizer {
    /// Reassembles a trained quantizer, checking that all parts agree on the
    /// dimension.
    pub fn from_parts(
        dimension: VectorDimension,
        centroids: Vec<Vec<f32>>,
        codebook: Option<ProductQuantizer>,
    ) -> Result<Self, VectorError> {
        if centroids.is_empty() {
            return Err(VectorError::InvalidFormat(
                "quantizer has no centroids".to_string(),
            ));
        }
        for centroid in &centroids {
            dimension.validate_vector(centroid)?;
        }
        if let Some(pq) = &codebook {
            if pq.dimension() != dimension.get() {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension.get(),
                    actual: pq.dimension(),
                });
            }
        }
        Ok(Self {
            dimension,
            centroids,
            codebook,
        })
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    #[must_use]
    pub fn codebook(&self) -> Option<&ProductQuantizer> {
        self.codebook.as_ref()
    }

    #[must_use]
    pub fn is_quantized(&self) -> bool {
        self.codebook.is_some()
    }

    /// Cluster whose centroid is nearest to `vector`.
    #[must_use]
    pub fn assign(&self, vector: &[f32]) -> ClusterId {
        assign_to_nearest_centroid(vector, &self.centroids)
    }

    /// The `nprobe` clusters nearest to `query`, nearest first.
    #[must_use]
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<ClusterId> {
        nearest_centroids(query, &self.centroids, nprobe)
            .into_iter()
            .map(|(cluster, _)| cluster)
            .collect()
    }

    /// `vector - centroid(cluster)`.
    #[must_use]
    pub fn residual(&self, cluster: ClusterId, vector: &[f32]) -> Vec<f32> {
        residual(vector, &self.centroids[cluster.index()])
    }
}

fn residual(vector: &[f32], centroid: &[f32]) -> Vec<f32> {
    vector.iter().zip(centroid).map(|(v, c)| v - c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                (0..dim)
                    .map(|j| (((i + 1) * (j + 3)) % 17) as f32 - 8.0)
                    .collect()
            })
            .collect()
    }

    fn refs(vectors: &[Vec<f32>]) -> Vec<&[f32]> {
        vectors.iter().map(|v| v.as_slice()).collect()
    }

    #[test]
    fn test_empty_training_set() {
        let quantizer = ClusteringQuantizer::default();
        assert!(matches!(
            quantizer.train(&[]),
            Err(VectorError::InsufficientData { got: 0 })
        ));
    }

    #[test]
    fn test_cluster_count_follows_heuristic() {
        let vectors = corpus(400, 8);
        let quantizer = ClusteringQuantizer::new(QuantizerConfig {
            quantization: Quantization::Flat,
            ..Default::default()
        });
        let trained = quantizer.train(&refs(&vectors)).unwrap();
        assert_eq!(trained.cluster_count(), 10);
        assert!(!trained.is_quantized());
    }

    #[test]
    fn test_tiny_corpus_clamps_to_point_count() {
        let vectors = corpus(2, 8);
        let trained = ClusteringQuantizer::default().train(&refs(&vectors)).unwrap();
        assert_eq!(trained.cluster_count(), 2);
    }

    #[test]
    fn test_product_quantization_falls_back_when_undersampled() {
        let vectors = corpus(100, 8);
        let trained = ClusteringQuantizer::default().train(&refs(&vectors)).unwrap();
        assert!(!trained.is_quantized());
    }

    #[test]
    fn test_product_quantization_trains_codebook() {
        let vectors = corpus(300, 8);
        let quantizer = ClusteringQuantizer::new(QuantizerConfig {
            quantization: Quantization::Product {
                subvectors: 4,
                bits: 6,
            },
            ..Default::default()
        });
        let trained = quantizer.train(&refs(&vectors)).unwrap();
        let pq = trained.codebook().unwrap();
        assert_eq!(pq.num_subvectors(), 4);
        assert_eq!(pq.codebook_size(), 64);
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let vectors = corpus(50, 10);
        let quantizer = ClusteringQuantizer::new(QuantizerConfig {
            quantization: Quantization::Product {
                subvectors: 8,
                bits: 8,
            },
            ..Default::default()
        });
        assert!(matches!(
            quantizer.train(&refs(&vectors)),
            Err(VectorError::InvalidQuantization { .. })
        ));
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        assert!(matches!(
            ClusteringQuantizer::default().train(&refs(&vectors)),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_probe_is_nearest_first() {
        let trained = TrainedQuantizer::from_parts(
            VectorDimension::new(1).unwrap(),
            vec![vec![0.0], vec![5.0], vec![10.0]],
            None,
        )
        .unwrap();
        let probed: Vec<u32> = trained.probe(&[9.0], 2).iter().map(|c| c.get()).collect();
        assert_eq!(probed, vec![2, 1]);
        assert_eq!(trained.assign(&[1.0]).get(), 0);
    }
}
