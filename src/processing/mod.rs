//! Background archive ingestion with a persistent job queue

mod job_queue;
mod worker;

pub use job_queue::{ArchiveJob, JobProgress, JobQueue};
pub use worker::ArchiveWorker;
