//! Tenant-scoped similarity search over stored chunks
//!
//! The query is embedded once, candidates are restricted to the requesting
//! property in SQL before any scoring, and ranking is a full linear cosine
//! scan over the surviving chunks.

use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::storage::RegistryDb;

/// One ranked retrieval result
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub document_id: Uuid,
    pub property_id: Uuid,
    pub chunk_key: String,
    pub text: String,
    /// Cosine similarity against the query, higher is better
    pub score: f32,
}

/// Cosine similarity between a query and a candidate vector
///
/// A zero-norm query scores 0 against everything. Candidate norms are
/// floored at 1e-12 so a degenerate stored vector cannot divide by zero.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    let query_norm = query.iter().map(|v| v * v).sum::<f32>().sqrt();
    if query_norm == 0.0 {
        return 0.0;
    }
    let candidate_norm = candidate
        .iter()
        .map(|v| v * v)
        .sum::<f32>()
        .sqrt()
        .max(1e-12);
    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    dot / (query_norm * candidate_norm)
}

/// Embeds questions and ranks a property's chunks by similarity
pub struct Retriever {
    db: Arc<RegistryDb>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Create a new retriever
    pub fn new(db: Arc<RegistryDb>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, embedder }
    }

    /// Return the top `k` chunks of a property for a question
    ///
    /// `k` is clamped to at least 1. An optional document filter narrows
    /// the scan to a single document within the same property.
    pub async fn search(
        &self,
        question: &str,
        property_id: Uuid,
        document_id: Option<Uuid>,
        k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let query = vec![question.to_string()];
        let mut vectors = self.embedder.embed_batch(&query).await?;
        let Some(query_vector) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let candidates = self.db.chunk_candidates(property_id, document_id)?;
        let mut hits: Vec<RetrievalHit> = candidates
            .into_iter()
            .map(|c| RetrievalHit {
                score: cosine_similarity(&query_vector, &c.embedding),
                document_id: c.document_id,
                property_id: c.property_id,
                chunk_key: c.chunk_key,
                text: c.text,
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k.max(1));

        tracing::debug!(
            property_id = %property_id,
            returned = hits.len(),
            "similarity search completed"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{ChunkRecord, Document};
    use async_trait::async_trait;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }

        fn dimensions(&self) -> usize {
            self.vector.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn store_chunk(db: &RegistryDb, property_id: Uuid, text: &str, embedding: Vec<f32>) -> Uuid {
        let document = Document::new(property_id, format!("{text}.pdf"));
        let record = ChunkRecord {
            document_id: document.id,
            chunk_key: ChunkRecord::key(document.id, 1, 0),
            text: text.to_string(),
            embedding,
        };
        db.insert_document_with_chunks(&document, &[record]).unwrap();
        document.id
    }

    #[test]
    fn zero_norm_query_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_norm_candidate_does_not_divide_by_zero() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]);
        assert!(score.is_finite());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn parallel_vectors_score_higher_than_orthogonal() {
        let query = [1.0, 0.0];
        assert!(cosine_similarity(&query, &[2.0, 0.0]) > cosine_similarity(&query, &[0.0, 3.0]));
    }

    #[tokio::test]
    async fn ranks_by_similarity_descending() {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();
        store_chunk(&db, property_id, "aligned", vec![1.0, 0.0]);
        store_chunk(&db, property_id, "orthogonal", vec![0.0, 1.0]);
        store_chunk(&db, property_id, "diagonal", vec![1.0, 1.0]);

        let retriever = Retriever::new(db, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));
        let hits = retriever.search("frage", property_id, None, 3).await.unwrap();

        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["aligned", "diagonal", "orthogonal"]);
    }

    #[tokio::test]
    async fn results_never_cross_property_boundaries() {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_a = Uuid::new_v4();
        let property_b = Uuid::new_v4();
        db.create_property(property_a, "Haus A").unwrap();
        db.create_property(property_b, "Haus B").unwrap();
        store_chunk(&db, property_a, "mine", vec![1.0, 0.0]);
        store_chunk(&db, property_b, "theirs", vec![1.0, 0.0]);

        let retriever = Retriever::new(db, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));
        let hits = retriever.search("frage", property_a, None, 10).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "mine");
        assert_eq!(hits[0].property_id, property_a);
    }

    #[tokio::test]
    async fn document_filter_narrows_within_the_property() {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();
        let doc_a = store_chunk(&db, property_id, "first", vec![1.0, 0.0]);
        store_chunk(&db, property_id, "second", vec![1.0, 0.0]);

        let retriever = Retriever::new(db, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));
        let hits = retriever
            .search("frage", property_id, Some(doc_a), 10)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, doc_a);
    }

    #[tokio::test]
    async fn empty_store_returns_no_hits() {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();

        let retriever = Retriever::new(db, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));
        let hits = retriever.search("frage", property_id, None, 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn zero_k_is_clamped_to_one() {
        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();
        store_chunk(&db, property_id, "only", vec![1.0, 0.0]);
        store_chunk(&db, property_id, "other", vec![0.5, 0.0]);

        let retriever = Retriever::new(db, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));
        let hits = retriever.search("frage", property_id, None, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn empty_embedding_batch_yields_no_hits() {
        struct Silent;

        #[async_trait]
        impl EmbeddingProvider for Silent {
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(Vec::new())
            }

            fn dimensions(&self) -> usize {
                2
            }

            fn name(&self) -> &str {
                "silent"
            }
        }

        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();
        store_chunk(&db, property_id, "indexed", vec![1.0, 0.0]);

        let retriever = Retriever::new(db, Arc::new(Silent));
        let hits = retriever.search("frage", property_id, None, 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn embedder_outage_surfaces_as_error() {
        struct Offline;

        #[async_trait]
        impl EmbeddingProvider for Offline {
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Err(Error::embedding("offline"))
            }

            fn dimensions(&self) -> usize {
                2
            }

            fn name(&self) -> &str {
                "offline"
            }
        }

        let db = Arc::new(RegistryDb::in_memory().unwrap());
        let property_id = Uuid::new_v4();
        db.create_property(property_id, "Haus A").unwrap();

        let retriever = Retriever::new(db, Arc::new(Offline));
        let err = retriever
            .search("frage", property_id, None, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }
}
