//! SQLite persistence for the property knowledge registry

mod database;

pub use database::{ChunkCandidate, RegistryDb};
