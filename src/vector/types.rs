//! Type-safe wrappers and core types for the vector index.
//!
//! Newtypes keep record identifiers, cluster ids and internal positions from
//! being mixed up. Every failure of the index subsystem is a [`VectorError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distance above which every match is reported with similarity 0.0.
pub const SIMILARITY_DISTANCE_CAP: f32 = 100.0;

/// External record identifier (a job posting id).
///
/// Opaque to the index: it is only ever looked up through the side table
/// that maps internal positions back to records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a new `RecordId`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a cluster (coarse quantizer cell), zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(u32);

impl ClusterId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the id as a slice index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal position of a vector: the order in which it was added.
///
/// Positions are what posting lists hold; the side table resolves them to
/// [`RecordId`]s. [`Position::INVALID`] marks a slot that was never populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(u32);

impl Position {
    /// Sentinel for an unpopulated posting-list slot.
    pub const INVALID: Position = Position(u32::MAX);

    #[must_use]
    pub const fn new(position: u32) -> Self {
        Self(position)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

/// Type-safe wrapper for similarity scores.
///
/// Scores are normalized to the range [0.0, 1.0] where:
/// - 1.0 indicates distance zero
/// - 0.0 indicates a distance at or beyond [`SIMILARITY_DISTANCE_CAP`]
///
/// The mapping from distance is a linear rescaling, not a calibrated
/// probability. Scores are only comparable within one index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [0.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [0.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Converts a squared L2 distance into a similarity score.
    ///
    /// `1 - min(distance, CAP) / CAP`, clamped to [0, 1]. A NaN distance maps
    /// to zero similarity.
    #[must_use]
    pub fn from_distance(distance: f32) -> Self {
        if distance.is_nan() {
            return Self::zero();
        }
        let capped = distance.clamp(0.0, SIMILARITY_DISTANCE_CAP);
        Self((1.0 - capped / SIMILARITY_DISTANCE_CAP).clamp(0.0, 1.0))
    }

    /// Creates a score of 0.0 (no similarity).
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Creates a score of 1.0 (identical vectors).
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Every vector fed to one index must have exactly this many components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Squared Euclidean distance between two vectors of equal length.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Cannot train on {got} vectors\nSuggestion: Skip the index build until the corpus contains embeddings"
    )]
    InsufficientData { got: usize },

    #[error(
        "Index has not been trained\nSuggestion: Call train() with the corpus before adding or searching vectors"
    )]
    NotTrained,

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Unsupported index format version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version"
    )]
    FormatVersion { expected: u32, actual: u32 },

    #[error("No index named '{name}'\nSuggestion: Build the index before matching")]
    IndexNotFound { name: String },

    #[error("Invalid index data: {0}\nSuggestion: The blob may be truncated or corrupted; rebuild the index")]
    InvalidFormat(String),

    #[error("Invalid quantization parameters: {reason}\nSuggestion: Use a subvector count that divides the dimension and 1-8 bits")]
    InvalidQuantization { reason: String },

    #[error(
        "Position side table does not match the index: {reason}\nSuggestion: Rebuild the index; the stored id mapping cannot be trusted"
    )]
    MappingDrift { reason: String },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error("Batch length mismatch: {vectors} vectors but {ids} ids")]
    BatchLengthMismatch { vectors: usize, ids: usize },

    #[error("Index capacity exceeded: at most {max} vectors can be added")]
    CapacityExceeded { max: usize },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Clustering failed: {0}")]
    ClusteringFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_serialization() {
        let id = RecordId::new(3_904_095_574);
        let bytes = id.to_bytes();
        assert_eq!(RecordId::from_bytes(bytes), id);
    }

    #[test]
    fn test_position_sentinel() {
        assert!(!Position::INVALID.is_valid());
        assert!(Position::new(0).is_valid());
        assert!(Position::new(41) < Position::new(42));
    }

    #[test]
    fn test_score_validation() {
        let score = Score::new(0.5).unwrap();
        assert_eq!(score.get(), 0.5);

        assert!(Score::new(-0.1).is_err());
        assert!(Score::new(1.1).is_err());
        assert!(Score::new(f32::NAN).is_err());
    }

    #[test]
    fn test_score_from_distance() {
        assert_eq!(Score::from_distance(0.0), Score::one());
        assert!((Score::from_distance(25.0).get() - 0.75).abs() < f32::EPSILON);
        assert_eq!(Score::from_distance(100.0), Score::zero());
        assert_eq!(Score::from_distance(5_000.0), Score::zero());
        assert_eq!(Score::from_distance(f32::NAN), Score::zero());
        // Approximate distances can come out slightly negative
        assert_eq!(Score::from_distance(-1e-6), Score::one());
    }

    #[test]
    fn test_vector_dimension() {
        let dim = VectorDimension::new(768).unwrap();
        assert_eq!(dim.get(), 768);
        assert!(VectorDimension::new(0).is_err());

        assert!(dim.validate_vector(&vec![0.1; 768]).is_ok());
        assert!(matches!(
            dim.validate_vector(&vec![0.1; 100]),
            Err(VectorError::DimensionMismatch {
                expected: 768,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_l2_distance_squared() {
        assert_eq!(l2_distance_squared(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_eq!(l2_distance_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }
}
