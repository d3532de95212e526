//! Upload job tracking types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload job status
///
/// Transitions only move forward: pending -> processing -> completed | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Database column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database column representation
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Tracks one asynchronous batch-ingestion run
///
/// The persisted job row is the only externally visible progress signal;
/// callers poll it to learn the batch outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    /// Job ID
    pub id: Uuid,
    /// Owning property
    pub property_id: Uuid,
    /// Current status
    pub status: JobStatus,
    /// Documents ingested successfully
    pub processed_count: usize,
    /// Documents that failed validation or ingestion
    pub failed_count: usize,
    /// Names of the failed entries
    pub failed_filenames: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    /// Create a new pending job
    pub fn new(property_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            property_id,
            status: JobStatus::Pending,
            processed_count: 0,
            failed_count: 0,
            failed_filenames: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
