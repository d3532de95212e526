//! Embedding providers

mod openai;

pub use openai::OpenAiEmbedder;

use async_trait::async_trait;

use crate::error::Result;

/// Text embedding provider
///
/// Implementations return one vector per input, in input order. An empty
/// input must yield an empty output without any network call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors
    fn dimensions(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &str;
}
