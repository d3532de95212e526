//! Worker pool draining the archive job queue
//!
//! Each job has exactly one processing worker; the pool shares the channel
//! receiver behind a mutex so a job is delivered to exactly one of them.
//! Entry failures are recorded per file and never abort the batch.

use std::io::{Cursor, Read};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use zip::ZipArchive;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::IngestPipeline;
use crate::storage::RegistryDb;
use crate::types::JobStatus;

use super::job_queue::{ArchiveJob, JobQueue};

/// Processes queued archive jobs end to end
pub struct ArchiveWorker {
    db: Arc<RegistryDb>,
    pipeline: Arc<IngestPipeline>,
    queue: Arc<JobQueue>,
    limits: IngestConfig,
}

impl ArchiveWorker {
    /// Create a new worker
    pub fn new(
        db: Arc<RegistryDb>,
        pipeline: Arc<IngestPipeline>,
        queue: Arc<JobQueue>,
        limits: IngestConfig,
    ) -> Self {
        Self {
            db,
            pipeline,
            queue,
            limits,
        }
    }

    /// Spawn a pool of tasks draining the shared receiver
    pub fn spawn_pool(
        worker: Arc<Self>,
        receiver: mpsc::Receiver<ArchiveJob>,
        count: usize,
    ) -> Vec<JoinHandle<()>> {
        let receiver = Arc::new(Mutex::new(receiver));
        (0..count.max(1))
            .map(|worker_index| {
                let worker = worker.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker_index, "archive worker started");
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        match job {
                            Some(job) => worker.process_job(job).await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker_index, "archive worker stopped");
                })
            })
            .collect()
    }

    /// Run one job to a terminal state
    ///
    /// The pending row is claimed first; a job that is no longer pending is
    /// skipped, so a redelivered or replayed message cannot rewind state.
    pub async fn process_job(&self, job: ArchiveJob) {
        match self.db.mark_job_processing(job.id) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "job is not pending, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to claim job");
                return;
            }
        }
        self.queue.mark_processing(job.id);

        match self.run_entries(&job).await {
            Ok((processed, failed_filenames)) => {
                let failed = failed_filenames.len();
                let status = if processed == 0 && failed > 0 {
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };
                // Bookkeeping failures must not bring the worker down.
                if let Err(e) =
                    self.db
                        .finish_job(job.id, status, processed, failed, &failed_filenames)
                {
                    tracing::error!(job_id = %job.id, error = %e, "failed to persist job result");
                }
                self.queue.finish(job.id, status);
                tracing::info!(
                    job_id = %job.id,
                    processed,
                    failed,
                    status = status.as_str(),
                    "archive job finished"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "archive job failed before its entries");
                if let Err(pe) = self.db.finish_job(job.id, JobStatus::Failed, 0, 0, &[]) {
                    tracing::error!(job_id = %job.id, error = %pe, "failed to persist job failure");
                }
                self.queue.finish(job.id, JobStatus::Failed);
            }
        }
    }

    /// Ingest every PDF entry, collecting per-entry failures
    ///
    /// Returns an error only when nothing can be processed at all: the
    /// owning property vanished or the archive cannot be opened.
    async fn run_entries(&self, job: &ArchiveJob) -> Result<(usize, Vec<String>)> {
        if !self.db.property_exists(job.property_id)? {
            return Err(Error::PropertyNotFound(job.property_id));
        }
        let mut archive = ZipArchive::new(Cursor::new(job.archive.as_slice()))?;

        let mut processed = 0usize;
        let mut failed_filenames = Vec::new();

        for index in 0..archive.len() {
            let listed_name = archive
                .name_for_index(index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("entry {}", index + 1));
            let (name, data) = {
                let mut entry = match archive.by_index(index) {
                    Ok(entry) => entry,
                    Err(e) => {
                        // Corrupt local header behind a readable central directory
                        if !listed_name.to_lowercase().ends_with(".pdf") {
                            continue;
                        }
                        tracing::warn!(job_id = %job.id, entry = %listed_name, error = %e, "unreadable archive entry");
                        self.queue.record_failed(job.id);
                        failed_filenames.push(listed_name);
                        continue;
                    }
                };
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                if !name.to_lowercase().ends_with(".pdf") {
                    continue;
                }
                let mut data = Vec::with_capacity(entry.size() as usize);
                if let Err(e) = entry.read_to_end(&mut data) {
                    tracing::warn!(job_id = %job.id, entry = %name, error = %e, "unreadable archive entry");
                    self.queue.record_failed(job.id);
                    failed_filenames.push(name);
                    continue;
                }
                (name, data)
            };
            self.queue.set_current_entry(job.id, &name);

            if data.len() > self.limits.max_document_bytes {
                tracing::warn!(
                    job_id = %job.id,
                    entry = %name,
                    bytes = data.len(),
                    "entry exceeds the per-document size limit"
                );
                self.queue.record_failed(job.id);
                failed_filenames.push(name);
                continue;
            }

            match self.pipeline.ingest_document(job.property_id, &name, &data).await {
                Ok(outcome) => {
                    processed += 1;
                    self.queue.record_processed(job.id);
                    if let Some(warning) = outcome.quality_warning {
                        tracing::warn!(job_id = %job.id, entry = %name, %warning, "ingested with low quality");
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, entry = %name, error = %e, "entry failed to ingest");
                    self.queue.record_failed(job.id);
                    failed_filenames.push(name);
                }
            }
        }

        Ok((processed, failed_filenames))
    }
}
