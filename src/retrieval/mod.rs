//! Similarity search over the chunk registry

mod search;

pub use search::{cosine_similarity, RetrievalHit, Retriever};
