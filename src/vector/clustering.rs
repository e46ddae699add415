//! K-means clustering for the coarse quantizer and the PQ sub-codebooks.
//!
//! This module provides a pure Rust implementation of K-means clustering
//! over squared Euclidean distance with K-means++ initialization.
//!
//! # Algorithm Details
//! - Distance metric: squared L2
//! - Initialization: K-means++ from a seeded RNG, so identical input and seed
//!   produce identical centroids
//! - Max iterations: configurable, 25 by default
//! - Convergence: assignments stop changing or centroids move less than 1e-4
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) time complexity
//! - O(k * d) space for centroids
//! - Assignment step runs on the rayon pool

use crate::vector::types::{ClusterId, VectorError, l2_distance_squared};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lower bound on the number of coarse clusters.
pub const MIN_CLUSTERS: usize = 4;

/// Upper bound on the number of coarse clusters.
pub const MAX_CLUSTERS: usize = 256;

/// Training vectors wanted per cluster for the cluster-count heuristic.
pub const MIN_POINTS_PER_CLUSTER: usize = 39;

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Largest squared centroid shift still counted as movement.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f64 = 1e-12;

/// Number of coarse clusters for a corpus of `num_vectors` vectors.
///
/// `clamp(4, 256, floor(N / 39))`.
#[must_use]
pub fn cluster_count_for(num_vectors: usize) -> usize {
    (num_vectors / MIN_POINTS_PER_CLUSTER).clamp(MIN_CLUSTERS, MAX_CLUSTERS)
}

/// Tuning knobs for a K-means run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: 42,
        }
    }
}

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, each a vector of the same dimension as input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster assignment for each input vector, consistent with `centroids`.
    pub assignments: Vec<ClusterId>,

    /// Number of update iterations performed.
    pub iterations: usize,

    /// Whether the run stopped before exhausting the iteration budget.
    pub converged: bool,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are generated before clustering"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error("Vector operation error: {0}")]
    VectorError(#[from] VectorError),
}

/// Performs K-means clustering on a set of vectors.
///
/// # Arguments
/// * `vectors` - Input vectors to cluster (must be non-empty and same dimension)
/// * `k` - Number of clusters (must be >= 1 and <= number of vectors)
/// * `config` - Iteration budget and RNG seed
///
/// # Algorithm
/// 1. Initialize centroids using K-means++
/// 2. Iterate until convergence or max iterations:
///    - Recompute centroids as the mean of their members
///    - Reassign each vector to its nearest centroid
///    - Stop when assignments are stable or centroids barely move
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(
    vectors: &[&[f32]],
    k: usize,
    config: &KMeansConfig,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng);
    let mut assignments = assign_all(vectors, &centroids);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;

        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        let new_assignments = assign_all(vectors, &centroids);
        let stable = new_assignments == assignments;
        assignments = new_assignments;

        if stable || movement < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::debug!(
            "k-means stopped at the iteration budget ({}) without converging",
            config.max_iterations
        );
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
        converged,
    })
}

/// Assigns a vector to the nearest centroid by squared L2 distance.
///
/// Ties go to the lowest cluster index.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> ClusterId {
    let mut best_distance = f32::INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = l2_distance_squared(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_cluster = i;
        }
    }

    ClusterId::new(best_cluster as u32)
}

/// Returns the `n` centroids closest to `vector`, nearest first.
///
/// Ties are ordered by cluster index so probe order is deterministic.
pub fn nearest_centroids(vector: &[f32], centroids: &[Vec<f32>], n: usize) -> Vec<(ClusterId, f32)> {
    let mut ranked: Vec<(ClusterId, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (ClusterId::new(i as u32), l2_distance_squared(vector, c)))
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

fn assign_all(vectors: &[&[f32]], centroids: &[Vec<f32>]) -> Vec<ClusterId> {
    vectors
        .par_iter()
        .map(|vector| assign_to_nearest_centroid(vector, centroids))
        .collect()
}

/// Updates centroids as the mean of their assigned vectors.
///
/// An empty cluster is re-seeded on a random input vector.
fn update_centroids(
    vectors: &[&[f32]],
    assignments: &[ClusterId],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut sums = vec![vec![0.0f64; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, cluster_id) in vectors.iter().zip(assignments.iter()) {
        let cluster_idx = cluster_id.index();
        for (sum, &value) in sums[cluster_idx].iter_mut().zip(vector.iter()) {
            *sum += f64::from(value);
        }
        cluster_sizes[cluster_idx] += 1;
    }

    sums.into_iter()
        .zip(cluster_sizes)
        .map(|(sum, size)| {
            if size == 0 {
                let random_idx = rng.random_range(0..vectors.len());
                vectors[random_idx].to_vec()
            } else {
                sum.into_iter().map(|s| (s / size as f64) as f32).collect()
            }
        })
        .collect()
}

/// Initializes centroids using the K-means++ algorithm.
///
/// When every remaining vector coincides with a chosen centroid the rest of
/// the slots are filled with uniformly drawn vectors; the duplicates end up
/// empty and get re-seeded during the update step.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[&[f32]],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(vectors[first_idx].to_vec());

    // Squared distance from each vector to its closest chosen centroid
    let mut min_distances: Vec<f64> = vectors
        .iter()
        .map(|v| f64::from(l2_distance_squared(v, &centroids[0])))
        .collect();

    while centroids.len() < k {
        let total_distance: f64 = min_distances.iter().sum();

        let chosen = if total_distance < EPSILON {
            rng.random_range(0..vectors.len())
        } else {
            let target = rng.random::<f64>() * total_distance;
            let mut cumulative = 0.0;
            min_distances
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= target
                })
                .unwrap_or(vectors.len() - 1)
        };

        let centroid = vectors[chosen].to_vec();
        for (min_distance, vector) in min_distances.iter_mut().zip(vectors.iter()) {
            let distance = f64::from(l2_distance_squared(vector, &centroid));
            if distance < *min_distance {
                *min_distance = distance;
            }
        }
        centroids.push(centroid);
    }

    centroids
}

/// Largest squared shift of any centroid between iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| l2_distance_squared(old_c, new_c))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(vectors: &[Vec<f32>]) -> Vec<&[f32]> {
        vectors.iter().map(|v| v.as_slice()).collect()
    }

    #[test]
    fn test_cluster_count_heuristic() {
        assert_eq!(cluster_count_for(0), 4);
        assert_eq!(cluster_count_for(100), 4);
        assert_eq!(cluster_count_for(39 * 10), 10);
        assert_eq!(cluster_count_for(39 * 10 + 38), 10);
        assert_eq!(cluster_count_for(1_000_000), 256);
    }

    #[test]
    fn test_assign_to_nearest_centroid() {
        let centroids = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];

        assert_eq!(assign_to_nearest_centroid(&[0.9, 0.1, 0.0], &centroids).get(), 0);
        assert_eq!(assign_to_nearest_centroid(&[0.1, 0.9, 0.1], &centroids).get(), 1);
        assert_eq!(assign_to_nearest_centroid(&[0.0, 0.1, 0.9], &centroids).get(), 2);

        // Equidistant: lowest index wins
        assert_eq!(assign_to_nearest_centroid(&[0.5, 0.5, 0.0], &centroids).get(), 0);
    }

    #[test]
    fn test_nearest_centroids_order() {
        let centroids = vec![vec![10.0], vec![0.0], vec![1.0], vec![-1.0]];
        let ranked = nearest_centroids(&[0.0], &centroids, 3);
        let ids: Vec<u32> = ranked.iter().map(|(c, _)| c.get()).collect();
        // 2 and 3 are tied at distance 1.0
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(nearest_centroids(&[0.0], &centroids, 10).len(), 4);
    }

    #[test]
    fn test_kmeans_clustering_basic() {
        let vectors = vec![
            vec![10.0, 0.1, 0.0],
            vec![9.9, 0.2, 0.1],
            vec![10.1, 0.0, 0.2],
            vec![0.1, 10.0, 0.0],
            vec![0.2, 9.9, 0.1],
            vec![0.0, 10.1, 0.2],
            vec![0.0, 0.1, 10.0],
            vec![0.1, 0.2, 9.9],
            vec![0.2, 0.0, 10.1],
        ];

        let result = kmeans_clustering(&refs(&vectors), 3, &KMeansConfig::default()).unwrap();

        assert_eq!(result.centroids.len(), 3);
        assert_eq!(result.assignments.len(), 9);
        assert!(result.iterations <= DEFAULT_MAX_ITERATIONS);

        for group in result.assignments.chunks(3) {
            assert!(group.iter().all(|&c| c == group[0]));
        }
        assert_ne!(result.assignments[0], result.assignments[3]);
        assert_ne!(result.assignments[3], result.assignments[6]);
        assert_ne!(result.assignments[0], result.assignments[6]);
    }

    #[test]
    fn test_assignments_match_nearest_centroid() {
        let vectors: Vec<Vec<f32>> = (0..60)
            .map(|i| vec![(i % 7) as f32, (i / 7) as f32, ((i * 13) % 5) as f32])
            .collect();

        let result = kmeans_clustering(&refs(&vectors), 5, &KMeansConfig::default()).unwrap();
        for (vector, cluster) in vectors.iter().zip(&result.assignments) {
            assert_eq!(assign_to_nearest_centroid(vector, &result.centroids), *cluster);
        }
    }

    #[test]
    fn test_kmeans_is_deterministic_for_seed() {
        let vectors: Vec<Vec<f32>> = (0..40)
            .map(|i| vec![(i as f32).sin(), (i as f32).cos()])
            .collect();
        let config = KMeansConfig {
            max_iterations: 10,
            seed: 7,
        };

        let a = kmeans_clustering(&refs(&vectors), 4, &config).unwrap();
        let b = kmeans_clustering(&refs(&vectors), 4, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kmeans_with_coincident_points() {
        let vectors = vec![vec![1.0, 1.0]; 6];
        let result = kmeans_clustering(&refs(&vectors), 4, &KMeansConfig::default()).unwrap();

        assert_eq!(result.centroids.len(), 4);
        assert!(result.centroids.iter().all(|c| c == &vec![1.0, 1.0]));
    }

    #[test]
    fn test_kmeans_edge_cases() {
        let vectors: Vec<Vec<f32>> = vec![];
        assert!(matches!(
            kmeans_clustering(&refs(&vectors), 1, &KMeansConfig::default()),
            Err(ClusteringError::EmptyVectorSet)
        ));

        let vectors = vec![vec![1.0, 2.0]];
        assert!(matches!(
            kmeans_clustering(&refs(&vectors), 0, &KMeansConfig::default()),
            Err(ClusteringError::InvalidClusterCount(0))
        ));

        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert!(matches!(
            kmeans_clustering(&refs(&vectors), 3, &KMeansConfig::default()),
            Err(ClusteringError::InvalidClusterCount(3))
        ));

        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0, 5.0]];
        assert!(matches!(
            kmeans_clustering(&refs(&vectors), 1, &KMeansConfig::default()),
            Err(ClusteringError::DimensionMismatch)
        ));
    }

    #[test]
    fn test_single_cluster_is_mean() {
        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let result = kmeans_clustering(&refs(&vectors), 1, &KMeansConfig::default()).unwrap();

        assert_eq!(result.centroids.len(), 1);
        assert!((result.centroids[0][0] - 3.0).abs() < 1e-5);
        assert!((result.centroids[0][1] - 4.0).abs() < 1e-5);
        assert!(result.assignments.iter().all(|c| c.get() == 0));
    }
}
