//! Extract, chunk, embed and persist documents for one property

use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::extraction::DocumentExtractor;
use crate::ingestion::{ChunkPiece, TextChunker};
use crate::storage::RegistryDb;
use crate::types::{ChunkRecord, Document};

fn unsafe_char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"))
}

/// Reduce an untrusted filename to a safe basename
///
/// Strips any directory components, replaces runs of characters outside
/// `[A-Za-z0-9._-]` with a single underscore and trims leading/trailing
/// dots and underscores. An empty result is rejected.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
        .trim();
    let safe = unsafe_char_re().replace_all(base, "_");
    let safe = safe.trim_matches(|c| c == '.' || c == '_');
    if safe.is_empty() {
        return Err(Error::invalid_input("filename is empty after sanitizing"));
    }
    Ok(safe.to_string())
}

/// Result of ingesting a single document
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub property_id: Uuid,
    pub filename: String,
    pub chunks_indexed: usize,
    pub quality_score: f64,
    /// Present when the extraction quality fell below the warning threshold
    pub quality_warning: Option<String>,
}

/// Orchestrates extraction, chunking, embedding and storage
///
/// Embeddings are requested before anything is written, so a failed
/// embedding call leaves the registry untouched.
pub struct IngestPipeline {
    db: Arc<RegistryDb>,
    extractor: Arc<dyn DocumentExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RagConfig,
}

impl IngestPipeline {
    /// Create a new pipeline
    pub fn new(
        db: Arc<RegistryDb>,
        extractor: Arc<dyn DocumentExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RagConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            config,
        }
    }

    /// Ingest one PDF document for a property
    ///
    /// Validates the filename, size and content signature, extracts and
    /// chunks the text, embeds every chunk in one batched call and stores
    /// the document together with its chunks in a single transaction.
    pub async fn ingest_document(
        &self,
        property_id: Uuid,
        filename: &str,
        data: &[u8],
    ) -> Result<IngestOutcome> {
        if !self.db.property_exists(property_id)? {
            return Err(Error::PropertyNotFound(property_id));
        }
        let safe_name = sanitize_filename(filename)?;
        if !safe_name.to_lowercase().ends_with(".pdf") {
            return Err(Error::invalid_input(format!(
                "only PDF files are accepted, got '{}'",
                safe_name
            )));
        }
        let limit = self.config.ingest.max_document_bytes;
        if data.len() > limit {
            return Err(Error::invalid_input(format!(
                "'{}' is {} bytes, limit is {}",
                safe_name,
                data.len(),
                limit
            )));
        }
        if !self.extractor.sniff(data) {
            return Err(Error::extraction(
                &safe_name,
                "content does not carry a PDF signature",
            ));
        }

        let extraction = self.extractor.extract(&safe_name, data)?;
        let quality_warning = self.quality_warning(&safe_name, extraction.quality_score);

        let chunker = TextChunker::from_config(&self.config.chunking);
        let pieces = chunker.chunk(&extraction.text)?;

        let mut document = Document::new(property_id, safe_name.clone());
        document.extracted_text = Some(extraction.text.clone());
        document.quality_score = Some(extraction.quality_score);

        let records = self.embed_pieces(document.id, &pieces).await?;
        self.db.insert_document_with_chunks(&document, &records)?;

        tracing::info!(
            document_id = %document.id,
            property_id = %property_id,
            filename = %safe_name,
            chunks = records.len(),
            quality = extraction.quality_score,
            "document ingested"
        );

        Ok(IngestOutcome {
            document_id: document.id,
            property_id,
            filename: safe_name,
            chunks_indexed: records.len(),
            quality_score: extraction.quality_score,
            quality_warning,
        })
    }

    /// Re-chunk and re-embed a stored document from its persisted text
    ///
    /// Replaces the document's chunks atomically and returns the new chunk
    /// count. The stored extraction is reused, the original bytes are not
    /// needed.
    pub async fn reindex_document(&self, document_id: Uuid) -> Result<usize> {
        let document = self.db.get_document(document_id)?;
        let text = document.extracted_text.ok_or_else(|| {
            Error::invalid_input("document has no stored extraction to reindex from")
        })?;

        let chunker = TextChunker::from_config(&self.config.chunking);
        let pieces = chunker.chunk(&text)?;
        let records = self.embed_pieces(document_id, &pieces).await?;
        self.db.upsert_chunks(document_id, &records)?;

        tracing::info!(
            document_id = %document_id,
            chunks = records.len(),
            "document reindexed"
        );
        Ok(records.len())
    }

    fn quality_warning(&self, filename: &str, score: f64) -> Option<String> {
        let threshold = self.config.extraction.quality_warn_threshold;
        if score >= threshold {
            return None;
        }
        tracing::warn!(
            filename = %filename,
            quality = score,
            threshold,
            "low extraction quality, document may be scanned images"
        );
        Some(format!(
            "Low extraction quality ({:.2}): the PDF may contain scanned \
             images without machine-readable text, answers drawn from it \
             may be incomplete",
            score
        ))
    }

    async fn embed_pieces(
        &self,
        document_id: Uuid,
        pieces: &[ChunkPiece],
    ) -> Result<Vec<ChunkRecord>> {
        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        Ok(pieces
            .iter()
            .zip(vectors)
            .map(|(piece, embedding)| ChunkRecord {
                document_id,
                chunk_key: ChunkRecord::key(document_id, piece.page, piece.page_index),
                text: piece.text.clone(),
                embedding,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::Extraction;
    use async_trait::async_trait;

    struct PlainTextExtractor;

    impl DocumentExtractor for PlainTextExtractor {
        fn sniff(&self, data: &[u8]) -> bool {
            data.starts_with(b"%PDF")
        }

        fn extract(&self, filename: &str, data: &[u8]) -> Result<Extraction> {
            let body = std::str::from_utf8(data).unwrap_or("");
            if body.contains("CORRUPT") {
                return Err(Error::extraction(filename, "unreadable document"));
            }
            Ok(Extraction {
                text: format!(
                    "\n\n--- PAGE 1 ---\n{}\n\nTABLES:\n(no tables detected)",
                    body
                ),
                quality_score: 0.8,
                total_pages: 1,
                pages_with_text: 1,
            })
        }

        fn name(&self) -> &str {
            "plain-text"
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "unit"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::embedding("provider offline"))
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn pipeline_with(embedder: Arc<dyn EmbeddingProvider>) -> (Arc<RegistryDb>, IngestPipeline) {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let pipeline = IngestPipeline::new(
            db.clone(),
            Arc::new(PlainTextExtractor),
            embedder,
            RagConfig::default(),
        );
        (db, pipeline)
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(
            sanitize_filename("../../etc/pass wd#1.pdf").unwrap(),
            "pass_wd_1.pdf"
        );
        assert_eq!(sanitize_filename("Abrechnung 2024.pdf").unwrap(), "Abrechnung_2024.pdf");
        assert_eq!(sanitize_filename("..hidden_.").unwrap(), "hidden");
        assert!(sanitize_filename("///").is_err());
        assert!(sanitize_filename("...").is_err());
    }

    #[tokio::test]
    async fn ingests_a_valid_document_end_to_end() {
        let (db, pipeline) = pipeline_with(Arc::new(UnitEmbedder));
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Musterstrasse 1").unwrap();

        let outcome = pipeline
            .ingest_document(property_id, "report.pdf", b"%PDF some extracted text")
            .await
            .unwrap();

        assert_eq!(outcome.filename, "report.pdf");
        assert!(outcome.chunks_indexed > 0);
        assert!(outcome.quality_warning.is_none());
        assert_eq!(
            db.chunk_count(outcome.document_id).unwrap(),
            outcome.chunks_indexed
        );
        let stored = db.get_document(outcome.document_id).unwrap();
        assert!(stored.extracted_text.unwrap().contains("some extracted text"));
        assert_eq!(stored.quality_score, Some(0.8));
    }

    #[tokio::test]
    async fn rejects_unknown_property() {
        let (_db, pipeline) = pipeline_with(Arc::new(UnitEmbedder));
        let err = pipeline
            .ingest_document(Uuid::new_v4(), "report.pdf", b"%PDF text")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PropertyNotFound(_)));
    }

    #[tokio::test]
    async fn rejects_non_pdf_extension_and_bad_signature() {
        let (db, pipeline) = pipeline_with(Arc::new(UnitEmbedder));
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus").unwrap();

        let err = pipeline
            .ingest_document(property_id, "notes.txt", b"%PDF text")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = pipeline
            .ingest_document(property_id, "fake.pdf", b"MZ not a pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[tokio::test]
    async fn rejects_oversized_document() {
        let (db, mut config) = (Arc::new(RegistryDb::in_memory().unwrap()), RagConfig::default());
        config.ingest.max_document_bytes = 16;
        let pipeline = IngestPipeline::new(
            db.clone(),
            Arc::new(PlainTextExtractor),
            Arc::new(UnitEmbedder),
            config,
        );
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus").unwrap();

        let err = pipeline
            .ingest_document(property_id, "big.pdf", b"%PDF 0123456789012345678")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let (db, pipeline) = pipeline_with(Arc::new(FailingEmbedder));
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus").unwrap();

        let err = pipeline
            .ingest_document(property_id, "report.pdf", b"%PDF text")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
        assert!(db.list_documents(property_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn reindex_rebuilds_chunks_from_stored_text() {
        let (db, pipeline) = pipeline_with(Arc::new(UnitEmbedder));
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus").unwrap();

        let outcome = pipeline
            .ingest_document(property_id, "report.pdf", b"%PDF stored body")
            .await
            .unwrap();
        let count = pipeline.reindex_document(outcome.document_id).await.unwrap();
        assert_eq!(count, outcome.chunks_indexed);
        assert_eq!(db.chunk_count(outcome.document_id).unwrap(), count);
    }

    #[tokio::test]
    async fn reindex_of_missing_document_fails() {
        let (_db, pipeline) = pipeline_with(Arc::new(UnitEmbedder));
        let err = pipeline.reindex_document(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }
}
