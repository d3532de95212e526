//! Core data types

pub mod document;
pub mod job;

pub use document::{ChunkRecord, Document};
pub use job::{JobStatus, UploadJob};
