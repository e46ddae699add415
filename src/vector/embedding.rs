//! Embedding collaborator.
//!
//! The index never looks at text. Anything that turns text into fixed-length
//! vectors implements [`EmbeddingGenerator`]; [`FastEmbedGenerator`] is the
//! production implementation backed by fastembed.

use std::path::Path;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::vector::types::{VectorDimension, VectorError};

/// Default model name, as written in configuration.
pub const DEFAULT_MODEL: &str = "AllMiniLML6V2";

/// Characters per chunk when embedding long text.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; one generator is shared by every
/// query and embedding job of an engine.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Resolves a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    let model = match name {
        "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
        "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
        "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
        "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
        "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
        "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
        "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
        "ParaphraseMLMiniLML12V2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        other => {
            return Err(VectorError::EmbeddingFailed(format!(
                "Unknown embedding model '{other}'"
            )));
        }
    };
    Ok(model)
}

/// FastEmbed-backed generator.
///
/// The dimension is discovered by embedding a probe string at load time, so
/// any supported model can be configured.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Loads `model_name`, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if the name is unknown or the model fails to load.
    pub fn new(
        model_name: &str,
        cache_dir: Option<&Path>,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model = parse_embedding_model(model_name)?;

        let mut options = InitOptions::new(model).with_show_download_progress(show_download_progress);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir.to_path_buf());
        }

        let mut text_model = TextEmbedding::try_new(options).map_err(|e| {
            VectorError::EmbeddingFailed(format!(
                "Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download"
            ))
        })?;

        let probe = text_model
            .embed(vec!["test"], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Probe embedding failed: {e}")))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| VectorError::EmbeddingFailed("Model returned no probe embedding".to_string()))?;

        tracing::debug!("Loaded embedding model {model_name} ({dimension} dimensions)");

        Ok(Self {
            model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            dimension: VectorDimension::new(dimension)?,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Embeds text of any length.
///
/// The text is cut into chunks of `chunk_size` characters, every chunk is
/// embedded, and the element-wise mean is returned. Empty or whitespace-only
/// text yields the zero vector.
pub fn embed_long_text(
    generator: &dyn EmbeddingGenerator,
    text: &str,
    chunk_size: usize,
) -> Result<Vec<f32>, VectorError> {
    let dimension = generator.dimension().get();
    if text.trim().is_empty() {
        return Ok(vec![0.0; dimension]);
    }

    let chunks = split_chunks(text, chunk_size.max(1));
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let embeddings = generator.generate_embeddings(&refs)?;
    if embeddings.len() != refs.len() {
        return Err(VectorError::EmbeddingFailed(format!(
            "Generator returned {} embeddings for {} chunks",
            embeddings.len(),
            refs.len()
        )));
    }

    let mut mean = vec![0.0f32; dimension];
    for embedding in &embeddings {
        generator.dimension().validate_vector(embedding)?;
        for (acc, value) in mean.iter_mut().zip(embedding) {
            *acc += value;
        }
    }
    let count = embeddings.len() as f32;
    for value in &mut mean {
        *value /= count;
    }

    Ok(mean)
}

fn split_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Mock embedding generator for testing.
///
/// Produces deterministic unit vectors from keyword hits so that texts
/// sharing vocabulary land near each other.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let keywords = ["rust", "python", "data", "manager", "sales", "nurse", "design", "cloud"];

        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut embedding = vec![0.1; dim];
                for (i, keyword) in keywords.iter().enumerate() {
                    if lower.contains(keyword) {
                        embedding[i % dim] += 1.0;
                    }
                }
                let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                embedding.iter().map(|x| x / magnitude).collect()
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
