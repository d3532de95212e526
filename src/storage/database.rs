//! SQLite registry for properties, documents, chunks and upload jobs
//!
//! One database file holds the whole tenant-scoped knowledge base. Chunk
//! embeddings are stored as JSON float arrays next to their text.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ChunkRecord, Document, JobStatus, UploadJob};

/// One chunk with its owning document and property, ready for scoring
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub document_id: Uuid,
    pub property_id: Uuid,
    pub chunk_key: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// SQLite-backed registry database
pub struct RegistryDb {
    conn: Arc<Mutex<Connection>>,
}

impl RegistryDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run idempotent migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL for concurrent readers during ingestion
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::storage(format!("failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS properties (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                property_id TEXT NOT NULL REFERENCES properties(id),
                filename TEXT NOT NULL,
                extracted_text TEXT,
                quality_score REAL,
                uploaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_property_id ON documents(property_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL REFERENCES documents(id),
                chunk_key TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                UNIQUE(document_id, chunk_key)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);

            CREATE TABLE IF NOT EXISTS upload_jobs (
                id TEXT PRIMARY KEY,
                property_id TEXT NOT NULL,
                status TEXT NOT NULL,
                processed_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                failed_filenames TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_upload_jobs_property_id ON upload_jobs(property_id);
        "#,
        )
        .map_err(|e| Error::storage(format!("migration failed: {}", e)))?;

        Ok(())
    }

    // --- properties ---

    /// Register a property
    pub fn create_property(&self, id: Uuid, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO properties (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), name, Utc::now()],
        )?;
        Ok(())
    }

    /// Whether a property exists
    pub fn property_exists(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM properties WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Remove a property together with its documents and chunks
    pub fn delete_property(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id IN \
             (SELECT id FROM documents WHERE property_id = ?1)",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM documents WHERE property_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute("DELETE FROM properties WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    // --- documents ---

    /// Store a document and its chunks in one transaction
    ///
    /// Either the document row and every chunk land together or nothing is
    /// written.
    pub fn insert_document_with_chunks(
        &self,
        document: &Document,
        chunks: &[ChunkRecord],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (id, property_id, filename, extracted_text, quality_score, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document.id.to_string(),
                document.property_id.to_string(),
                document.filename,
                document.extracted_text,
                document.quality_score,
                document.uploaded_at,
            ],
        )?;
        insert_chunks(&tx, document.id, chunks)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch one document
    pub fn get_document(&self, id: Uuid) -> Result<Document> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, property_id, filename, extracted_text, quality_score, uploaded_at \
             FROM documents WHERE id = ?1",
            params![id.to_string()],
            row_to_document,
        )
        .optional()?
        .ok_or(Error::DocumentNotFound(id))
    }

    /// List a property's documents, newest first
    pub fn list_documents(&self, property_id: Uuid) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, property_id, filename, extracted_text, quality_score, uploaded_at \
             FROM documents WHERE property_id = ?1 ORDER BY uploaded_at DESC",
        )?;
        let rows = stmt.query_map(params![property_id.to_string()], row_to_document)?;
        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    /// Delete a document and its chunks, returning the removed chunk count
    pub fn delete_document(&self, id: Uuid) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![id.to_string()],
        )?;
        let docs = tx.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        if docs == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(removed)
    }

    // --- chunks ---

    /// Replace a document's chunks atomically
    ///
    /// Delete-then-insert in one transaction, so readers never observe a
    /// mix of old and new chunks.
    pub fn upsert_chunks(&self, document_id: Uuid, chunks: &[ChunkRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        insert_chunks(&tx, document_id, chunks)?;
        tx.commit()?;
        Ok(())
    }

    /// Number of chunks stored for a document
    pub fn chunk_count(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All chunks of one property, optionally narrowed to one document
    ///
    /// The tenant filter is applied here, before any scoring. Rows whose
    /// stored embedding fails to parse are skipped with a warning.
    pub fn chunk_candidates(
        &self,
        property_id: Uuid,
        document_id: Option<Uuid>,
    ) -> Result<Vec<ChunkCandidate>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT c.document_id, d.property_id, c.chunk_key, c.text, c.embedding \
             FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE d.property_id = ?1 AND (?2 IS NULL OR c.document_id = ?2)",
        )?;
        let doc_filter = document_id.map(|id| id.to_string());
        let rows = stmt.query_map(params![property_id.to_string(), doc_filter], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (doc_id, prop_id, chunk_key, text, embedding_json) = row?;
            let embedding: Vec<f32> = match serde_json::from_str(&embedding_json) {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::warn!(
                        chunk_key = %chunk_key,
                        error = %e,
                        "skipping chunk with malformed embedding"
                    );
                    continue;
                }
            };
            candidates.push(ChunkCandidate {
                document_id: parse_uuid(&doc_id)?,
                property_id: parse_uuid(&prop_id)?,
                chunk_key,
                text,
                embedding,
            });
        }
        Ok(candidates)
    }

    // --- upload jobs ---

    /// Persist a new job in its initial state
    pub fn create_job(&self, job: &UploadJob) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO upload_jobs \
             (id, property_id, status, processed_count, failed_count, failed_filenames, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id.to_string(),
                job.property_id.to_string(),
                job.status.as_str(),
                job.processed_count as i64,
                job.failed_count as i64,
                serde_json::to_string(&job.failed_filenames)?,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch one job
    pub fn get_job(&self, id: Uuid) -> Result<UploadJob> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, property_id, status, processed_count, failed_count, failed_filenames, \
             created_at, updated_at FROM upload_jobs WHERE id = ?1",
            params![id.to_string()],
            row_to_job,
        )
        .optional()?
        .ok_or(Error::JobNotFound(id))
    }

    /// Claim a pending job for processing
    ///
    /// Returns false when the job was not in the pending state, which keeps
    /// transitions forward-only even with competing workers.
    pub fn mark_job_processing(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE upload_jobs SET status = 'processing', updated_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), Utc::now()],
        )?;
        Ok(changed > 0)
    }

    /// Move a processing job to a terminal state with its final tallies
    ///
    /// Returns false when the job was not in the processing state; terminal
    /// states are never overwritten.
    pub fn finish_job(
        &self,
        id: Uuid,
        status: JobStatus,
        processed_count: usize,
        failed_count: usize,
        failed_filenames: &[String],
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE upload_jobs SET status = ?2, processed_count = ?3, failed_count = ?4, \
             failed_filenames = ?5, updated_at = ?6 \
             WHERE id = ?1 AND status = 'processing'",
            params![
                id.to_string(),
                status.as_str(),
                processed_count as i64,
                failed_count as i64,
                serde_json::to_string(failed_filenames)?,
                Utc::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fail a job that never reached processing
    ///
    /// Used when a queued job can no longer be delivered to a worker.
    pub fn fail_job(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE upload_jobs SET status = 'failed', updated_at = ?2 \
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id.to_string(), Utc::now()],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(sql, [])?)
    }
}

fn insert_chunks(tx: &rusqlite::Transaction<'_>, document_id: Uuid, chunks: &[ChunkRecord]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO chunks (document_id, chunk_key, text, embedding) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for chunk in chunks {
        stmt.execute(params![
            document_id.to_string(),
            chunk.chunk_key,
            chunk.text,
            serde_json::to_string(&chunk.embedding)?,
        ])?;
    }
    Ok(())
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::storage(format!("invalid UUID in registry: {}", e)))
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let property_id: String = row.get(1)?;
    Ok(Document {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        property_id: Uuid::parse_str(&property_id).unwrap_or_default(),
        filename: row.get(2)?,
        extracted_text: row.get(3)?,
        quality_score: row.get(4)?,
        uploaded_at: row.get::<_, DateTime<Utc>>(5)?,
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadJob> {
    let id: String = row.get(0)?;
    let property_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let failed_filenames: String = row.get(5)?;
    Ok(UploadJob {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        property_id: Uuid::parse_str(&property_id).unwrap_or_default(),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        processed_count: row.get::<_, i64>(3)? as usize,
        failed_count: row.get::<_, i64>(4)? as usize,
        failed_filenames: serde_json::from_str(&failed_filenames).unwrap_or_default(),
        created_at: row.get::<_, DateTime<Utc>>(6)?,
        updated_at: row.get::<_, DateTime<Utc>>(7)?,
    })
}
