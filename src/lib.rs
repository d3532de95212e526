//! estate-rag: document-to-knowledge pipeline for property records
//!
//! Turns uploaded PDF documents (utility statements, owner assembly
//! minutes, contracts) into a tenant-scoped, searchable knowledge base.
//! Extraction produces page-tagged text with a quality score, chunking is
//! page- and table-aware, embeddings come from an OpenAI-compatible
//! gateway, and batch ZIP uploads run through an asynchronous job queue.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod ingestion;
pub mod processing;
pub mod retrieval;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use embeddings::{EmbeddingProvider, OpenAiEmbedder};
pub use error::{Error, Result};
pub use extraction::{DocumentExtractor, Extraction, PdfExtractor};
pub use ingestion::{IngestOutcome, IngestPipeline, TextChunker};
pub use processing::{ArchiveWorker, JobQueue};
pub use retrieval::{RetrievalHit, Retriever};
pub use storage::RegistryDb;
pub use types::{ChunkRecord, Document, JobStatus, UploadJob};
