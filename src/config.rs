//! Configuration module for the job matcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `JM_` and use double underscores
//! to separate nested levels:
//! - `JM_INDEX__NPROBE=16` sets `index.nprobe`
//! - `JM_INDEX__QUANTIZATION__ENABLED=false` sets `index.quantization.enabled`
//! - `JM_MATCHING__TOP_K=20` sets `matching.top_k`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matching::EngineConfig;
use crate::vector::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MODEL, DEFAULT_NPROBE, KMeansConfig, Quantization,
    QuantizerConfig,
};

/// Directory holding the settings file, searched for in ancestors.
pub const CONFIG_DIR: &str = ".jobmatch";

const ENV_PREFIX: &str = "JM_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory for vectors and index blobs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Workspace root directory (where .jobmatch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Name the index blobs are stored under
    #[serde(default = "default_index_name")]
    pub name: String,

    /// Clusters probed per query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// K-means iteration budget
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// K-means seed; identical input and seed give identical indexes
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Fixed cluster count instead of the corpus-size heuristic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_clusters: Option<usize>,

    #[serde(default)]
    pub quantization: QuantizationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QuantizationConfig {
    /// Store PQ codes instead of full vectors
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_subvectors")]
    pub subvectors: usize,

    #[serde(default = "default_bits")]
    pub bits: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Characters per chunk for long descriptions
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Model cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MatchingConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters of description shown per match
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".jobmatch/data")
}
fn default_true() -> bool {
    true
}
fn default_index_name() -> String {
    "job_matching_index".to_string()
}
fn default_nprobe() -> usize {
    DEFAULT_NPROBE
}
fn default_max_iterations() -> usize {
    KMeansConfig::default().max_iterations
}
fn default_seed() -> u64 {
    KMeansConfig::default().seed
}
fn default_subvectors() -> usize {
    8
}
fn default_bits() -> u8 {
    8
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_top_k() -> usize {
    10
}
fn default_preview_chars() -> usize {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            workspace_root: None,
            debug: false,
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            nprobe: default_nprobe(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
            num_clusters: None,
            quantization: QuantizationConfig::default(),
        }
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subvectors: default_subvectors(),
            bits: default_bits(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            chunk_size: default_chunk_size(),
            cache_dir: None,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl IndexConfig {
    /// Training parameters for the index builder.
    #[must_use]
    pub fn quantizer_config(&self) -> QuantizerConfig {
        let quantization = if self.quantization.enabled {
            Quantization::Product {
                subvectors: self.quantization.subvectors,
                bits: self.quantization.bits,
            }
        } else {
            Quantization::Flat
        };

        QuantizerConfig {
            quantization,
            kmeans: KMeansConfig {
                max_iterations: self.max_iterations,
                seed: self.seed,
            },
            num_clusters: self.num_clusters,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path, ENV_PREFIX)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref(), ENV_PREFIX)
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: &Path, env_prefix: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting levels; single underscores
            // stay inside field names
            .merge(Env::prefixed(env_prefix).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the settings file by looking for .jobmatch in ancestors
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .jobmatch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Data directory, resolved against the workspace root when relative.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.data_dir.is_relative() => root.join(&self.data_dir),
            _ => self.data_dir.clone(),
        }
    }

    /// Directory the index blobs are written to.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_path().join("index")
    }

    /// Engine parameters derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            index_name: self.index.name.clone(),
            model_name: self.embedding.model.clone(),
            nprobe: self.index.nprobe,
            quantizer: self.index.quantizer_config(),
            chunk_size: self.embedding.chunk_size,
            preview_chars: self.matching.preview_chars,
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    pub(crate) fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Job matcher configuration

# Version of the configuration schema
version = 1

# Vectors and index blobs (relative to the workspace root)
data_dir = ".jobmatch/data"

# Global debug mode
debug = false

[index]
# Name the index blobs are stored under
name = "job_matching_index"

# Clusters probed per query: larger is slower with better recall
nprobe = {nprobe}

# K-means iteration budget and seed
max_iterations = {max_iterations}
seed = {seed}

# Fixed cluster count; by default clamp(4, 256, vectors / 39)
# num_clusters = 64

[index.quantization]
# Store product-quantization codes instead of full vectors
enabled = true

# Subvectors per vector (must divide the embedding dimension)
subvectors = 8

# Bits per code (1-8); needs at least 2^bits vectors, else vectors are stored in full
bits = 8

[embedding]
# fastembed model name
model = "{model}"

# Characters per chunk when embedding long descriptions
chunk_size = {chunk_size}

# Model cache directory
# cache_dir = ".jobmatch/models"

[matching]
# Matches returned per query
top_k = 10

# Characters of description shown per match
preview_chars = 300
"#,
            nprobe = DEFAULT_NPROBE,
            max_iterations = default_max_iterations(),
            seed = default_seed(),
            model = DEFAULT_MODEL,
            chunk_size = DEFAULT_CHUNK_SIZE,
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.index.name, "job_matching_index");
        assert_eq!(settings.index.nprobe, 8);
        assert_eq!(settings.index.max_iterations, 25);
        assert!(settings.index.quantization.enabled);
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
        assert_eq!(settings.embedding.chunk_size, 512);
        assert_eq!(settings.matching.preview_chars, 300);
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.index, IndexConfig::default());
        assert_eq!(settings.embedding, EmbeddingConfig::default());
        assert_eq!(settings.matching, MatchingConfig::default());

        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(
            &config_path,
            r#"
[index]
nprobe = 32

[index.quantization]
enabled = false
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.index.nprobe, 32);
        assert_eq!(settings.index.quantizer_config().quantization, Quantization::Flat);
        assert_eq!(settings.index.seed, 42);
        assert_eq!(settings.matching.top_k, 10);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.index.num_clusters = Some(16);
        settings.matching.top_k = 3;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.index.num_clusters, Some(16));
        assert_eq!(loaded.matching.top_k, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[index]\nnprobe = 4\nseed = 9\n").unwrap();

        // Test-only prefix
        unsafe {
            std::env::set_var("JM_CFGTEST_INDEX__NPROBE", "16");
            std::env::set_var("JM_CFGTEST_MATCHING__TOP_K", "25");
        }

        let settings: Settings = Settings::figment(&config_path, "JM_CFGTEST_")
            .extract()
            .unwrap();
        assert_eq!(settings.index.nprobe, 16);
        assert_eq!(settings.index.seed, 9);
        assert_eq!(settings.matching.top_k, 25);

        unsafe {
            std::env::remove_var("JM_CFGTEST_INDEX__NPROBE");
            std::env::remove_var("JM_CFGTEST_MATCHING__TOP_K");
        }
    }

    #[test]
    fn test_engine_config() {
        let mut settings = Settings::default();
        settings.index.quantization.subvectors = 4;
        settings.index.quantization.bits = 6;

        let config = settings.engine_config();
        assert_eq!(config.index_name, "job_matching_index");
        assert_eq!(
            config.quantizer.quantization,
            Quantization::Product {
                subvectors: 4,
                bits: 6
            }
        );
        assert_eq!(config.preview_chars, 300);
    }
}
