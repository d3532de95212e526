//! Document ingestion: chunking plus the extract-embed-store pipeline

mod chunker;
mod pipeline;

pub use chunker::{ChunkPiece, TextChunker};
pub use pipeline::{sanitize_filename, IngestOutcome, IngestPipeline};
