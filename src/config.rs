//! Configuration for the document pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding service configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Upload limits
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::invalid_input(e.to_string()))
    }
}

/// Extraction quality heuristics
///
/// The weighting and normalization constants come from observed behavior on
/// property-management documents and are tunable, not proven optimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Weight of the pages-with-text ratio in the quality score
    #[serde(default = "default_page_weight")]
    pub page_weight: f64,
    /// Weight of the text-length score in the quality score
    #[serde(default = "default_length_weight")]
    pub length_weight: f64,
    /// Character count at which the length score saturates
    #[serde(default = "default_length_norm")]
    pub length_norm_chars: usize,
    /// Below this quality score an ingestion is flagged as likely image-only
    #[serde(default = "default_quality_warn")]
    pub quality_warn_threshold: f64,
}

fn default_page_weight() -> f64 {
    0.6
}
fn default_length_weight() -> f64 {
    0.4
}
fn default_length_norm() -> usize {
    15_000
}
fn default_quality_warn() -> f64 {
    0.3
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            page_weight: 0.6,
            length_weight: 0.4,
            length_norm_chars: 15_000,
            quality_warn_threshold: 0.3,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Carry-over between consecutive windows in characters
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_max_chars() -> usize {
    1200
}
fn default_overlap() -> usize {
    150
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            overlap: 150,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the OpenAI-compatible embeddings endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Embedding model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Vector dimensionality produced by the model
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Maximum texts per upstream request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// API key; falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_dimensions() -> usize {
    3072
}
fn default_batch_size() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            batch_size: 100,
            timeout_secs: 30,
            max_retries: 2,
            api_key: None,
        }
    }
}

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum size of a single document in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Maximum number of documents in one upload archive
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
    /// Maximum total uncompressed document size in one archive
    #[serde(default = "default_max_archive_total_bytes")]
    pub max_archive_total_bytes: u64,
}

fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_archive_entries() -> usize {
    100
}
fn default_max_archive_total_bytes() -> u64 {
    200 * 1024 * 1024
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
            max_archive_entries: 100,
            max_archive_total_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite registry database
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("estate-rag")
            .join("registry.db");
        Self { db_path }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of concurrent archive workers (default: CPU count, max 4)
    pub worker_count: Option<usize>,
}

impl ProcessingConfig {
    /// Resolve the worker count
    pub fn workers(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}
