//! Document and chunk types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document uploaded under a property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Owning property (tenant scope)
    pub property_id: Uuid,
    /// Sanitized filename as uploaded
    pub filename: String,
    /// Normalized page-tagged text; None until extraction has run
    pub extracted_text: Option<String>,
    /// Extraction quality score in [0, 1]; None until extraction has run
    pub quality_score: Option<f64>,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document prior to extraction
    pub fn new(property_id: Uuid, filename: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_id,
            filename,
            extracted_text: None,
            quality_score: None,
            uploaded_at: Utc::now(),
        }
    }
}

/// One retrievable unit of text with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Parent document ID
    pub document_id: Uuid,
    /// Stable key, unique per document
    pub chunk_key: String,
    /// Chunk text
    pub text: String,
    /// Embedding vector (dimensionality fixed by the embedding model)
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    /// Derive the stable chunk key from page number and intra-page sequence
    ///
    /// The key is deterministic for identical input, so re-ingesting the same
    /// document reproduces the same keys.
    pub fn key(document_id: Uuid, page: u32, page_index: u32) -> String {
        format!("{}-p{}-{}", document_id, page, page_index)
    }
}
