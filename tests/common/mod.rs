#![allow(dead_code)]

use jobmatch::{EmbeddingGenerator, JobRecord, RecordId, VectorDimension, VectorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic embedder: one axis per keyword, plus a small bias so no
/// text maps to the zero vector.
pub struct KeywordEmbedder {
    dimension: VectorDimension,
}

pub const KEYWORDS: [&str; 8] = [
    "rust", "python", "data", "manager", "sales", "nurse", "design", "cloud",
];

impl KeywordEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dim).unwrap(),
        }
    }
}

impl EmbeddingGenerator for KeywordEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut embedding = vec![0.05; dim];
                for (i, keyword) in KEYWORDS.iter().enumerate() {
                    if lower.contains(keyword) {
                        embedding[i % dim] += 1.0;
                    }
                }
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// `n` uniform random vectors in `[-1, 1)^dim`.
pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

/// `n` vectors scattered around `centers` well-separated blobs.
pub fn blob_vectors(n: usize, dim: usize, centers: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let anchors: Vec<Vec<f32>> = (0..centers)
        .map(|_| (0..dim).map(|_| rng.random_range(-10.0..10.0)).collect())
        .collect();
    (0..n)
        .map(|i| {
            anchors[i % centers]
                .iter()
                .map(|c| c + rng.random_range(-0.5..0.5))
                .collect()
        })
        .collect()
}

/// Pairs every vector with `RecordId(1000 + i)`.
pub fn with_ids(vectors: Vec<Vec<f32>>) -> Vec<(RecordId, Vec<f32>)> {
    vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| (RecordId::new(1000 + i as u64), v))
        .collect()
}

pub fn job(id: u64, title: &str, description: &str) -> JobRecord {
    JobRecord {
        id: RecordId::new(id),
        title: title.to_string(),
        company: "Acme".to_string(),
        description: description.to_string(),
    }
}

pub fn job_corpus() -> Vec<JobRecord> {
    vec![
        job(1, "Rust Developer", "Write rust services for the cloud"),
        job(2, "Data Analyst", "Python and data dashboards"),
        job(3, "Sales Manager", "Lead the sales team as manager"),
        job(4, "Nurse", "Care for patients as a registered nurse"),
        job(5, "Product Designer", "Product design for mobile apps"),
        job(6, "Data Engineer", "Build data pipelines in python on the cloud"),
        job(7, "Volunteer", "   "),
    ]
}

/// Exact top-`k` record ids by squared L2 distance.
pub fn brute_force(
    corpus: &[(RecordId, Vec<f32>)],
    query: &[f32],
    k: usize,
) -> Vec<RecordId> {
    let mut scored: Vec<(f32, RecordId)> = corpus
        .iter()
        .map(|(id, v)| (jobmatch::vector::l2_distance_squared(query, v), *id))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}
