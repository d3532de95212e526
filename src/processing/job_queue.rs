//! Queue for background ZIP archive ingestion
//!
//! Jobs are persisted to SQLite before they are enqueued, so their terminal
//! state survives a restart. A DashMap mirror carries live progress that
//! never needs to hit the database.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use zip::ZipArchive;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::storage::RegistryDb;
use crate::types::{JobStatus, UploadJob};

/// A queued archive waiting for a worker
#[derive(Debug)]
pub struct ArchiveJob {
    pub id: Uuid,
    pub property_id: Uuid,
    pub archive: Vec<u8>,
}

/// Live progress snapshot for one job
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub property_id: Uuid,
    pub status: JobStatus,
    /// PDF entries counted at submission time
    pub total_entries: usize,
    pub processed: usize,
    pub failed: usize,
    /// Entry currently being ingested
    pub current_entry: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    fn new(job: &UploadJob, total_entries: usize) -> Self {
        Self {
            job_id: job.id,
            property_id: job.property_id,
            status: job.status,
            total_entries,
            processed: 0,
            failed: 0,
            current_entry: None,
            updated_at: Utc::now(),
        }
    }
}

/// Accepts archives, persists the job row and hands work to the pool
pub struct JobQueue {
    db: Arc<RegistryDb>,
    sender: mpsc::Sender<ArchiveJob>,
    progress: DashMap<Uuid, JobProgress>,
    limits: IngestConfig,
}

impl JobQueue {
    /// Create a queue and the receiving end for the worker pool
    pub fn new(db: Arc<RegistryDb>, limits: IngestConfig) -> (Arc<Self>, mpsc::Receiver<ArchiveJob>) {
        let (sender, receiver) = mpsc::channel(64);
        let queue = Arc::new(Self {
            db,
            sender,
            progress: DashMap::new(),
            limits,
        });
        (queue, receiver)
    }

    /// Validate and enqueue an archive, returning the job ID immediately
    ///
    /// Archive-level limits are checked up front so an oversized upload is
    /// rejected before a job row exists. Per-entry problems are left for
    /// the worker to record.
    pub async fn submit(&self, property_id: Uuid, archive: Vec<u8>) -> Result<Uuid> {
        if !self.db.property_exists(property_id)? {
            return Err(Error::PropertyNotFound(property_id));
        }
        let total_entries = validate_archive(&archive, &self.limits)?;

        let job = UploadJob::new(property_id);
        self.db.create_job(&job)?;
        self.progress.insert(job.id, JobProgress::new(&job, total_entries));

        tracing::info!(
            job_id = %job.id,
            property_id = %property_id,
            entries = total_entries,
            bytes = archive.len(),
            "archive job queued"
        );

        let message = ArchiveJob {
            id: job.id,
            property_id,
            archive,
        };
        if self.sender.send(message).await.is_err() {
            // No worker will ever see this job, close it out now.
            if let Err(e) = self.db.fail_job(job.id) {
                tracing::error!(job_id = %job.id, error = %e, "failed to mark orphaned job");
            }
            self.update(job.id, |p| p.status = JobStatus::Failed);
            return Err(Error::storage("job queue is shut down"));
        }
        Ok(job.id)
    }

    /// Fetch the persisted state of a job
    pub fn job(&self, id: Uuid) -> Result<UploadJob> {
        self.db.get_job(id)
    }

    /// Live progress for a job, if it is still tracked in memory
    pub fn progress(&self, id: Uuid) -> Option<JobProgress> {
        self.progress.get(&id).map(|entry| entry.clone())
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut JobProgress)) {
        if let Some(mut entry) = self.progress.get_mut(&id) {
            f(&mut entry);
            entry.updated_at = Utc::now();
        }
    }

    pub(crate) fn mark_processing(&self, id: Uuid) {
        self.update(id, |p| p.status = JobStatus::Processing);
    }

    pub(crate) fn set_current_entry(&self, id: Uuid, name: &str) {
        self.update(id, |p| p.current_entry = Some(name.to_string()));
    }

    pub(crate) fn record_processed(&self, id: Uuid) {
        self.update(id, |p| p.processed += 1);
    }

    pub(crate) fn record_failed(&self, id: Uuid) {
        self.update(id, |p| p.failed += 1);
    }

    pub(crate) fn finish(&self, id: Uuid, status: JobStatus) {
        self.update(id, |p| {
            p.status = status;
            p.current_entry = None;
        });
    }
}

/// Check archive-level limits and count the PDF entries
pub(crate) fn validate_archive(data: &[u8], limits: &IngestConfig) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let mut pdf_entries = 0usize;
    let mut total_bytes = 0u64;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() || !entry.name().to_lowercase().ends_with(".pdf") {
            continue;
        }
        pdf_entries += 1;
        total_bytes += entry.size();
    }

    if pdf_entries == 0 {
        return Err(Error::Archive("archive contains no PDF documents".into()));
    }
    if pdf_entries > limits.max_archive_entries {
        return Err(Error::Archive(format!(
            "archive has {} PDF entries, limit is {}",
            pdf_entries, limits.max_archive_entries
        )));
    }
    if total_bytes > limits.max_archive_total_bytes {
        return Err(Error::Archive(format!(
            "archive holds {} uncompressed bytes, limit is {}",
            total_bytes, limits.max_archive_total_bytes
        )));
    }
    Ok(pdf_entries)
}
