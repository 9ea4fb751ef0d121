// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Core types for the offline backup queue.
//!
//! This module contains the fundamental data types: QueuedJob, JobResult,
//! JobStatus, and the derived QueueCounts aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Sync lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be reported to the server. Initial state.
    Pending,
    /// Claimed by a reconciliation pass; a report attempt is in flight.
    Syncing,
    /// Successfully reported. Terminal.
    Synced,
    /// Report attempts exhausted the retry budget. Terminal.
    Failed,
}

impl JobStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Syncing => "syncing",
            JobStatus::Synced => "synced",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true if this is a terminal state (synced or failed).
    ///
    /// Terminal jobs are never picked up by a reconciliation pass again;
    /// they only leave the store through pruning or explicit deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Synced | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "syncing" => Ok(JobStatus::Syncing),
            "synced" => Ok(JobStatus::Synced),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// Outcome of a completed backup job, attached to a [`QueuedJob`] once the
/// underlying backup finishes.
///
/// Persisted as JSON in the `backup_result` column and sent verbatim inside
/// batch reports, so field names match the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Whether the backup completed successfully.
    pub success: bool,
    /// When the backup run started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the backup run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Bytes added to the repository by this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_added: Option<i64>,
    /// Number of new files in this snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_new: Option<i64>,
    /// Number of changed files in this snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<i64>,
    /// Content-addressed snapshot identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Error message if the backup failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Destination repository identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

/// One unit of offline-pending work: a backup outcome (or a placeholder
/// awaiting one) that must eventually be reported to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Unique identifier, never reused.
    pub id: String,
    /// The schedule that produced this job.
    pub schedule_id: String,
    /// Human-readable schedule name, denormalized for display.
    pub schedule_name: String,
    /// When the job was due to run.
    pub scheduled_at: DateTime<Utc>,
    /// When the job entered the durable queue.
    pub queued_at: DateTime<Utc>,
    /// Current sync lifecycle state.
    pub status: JobStatus,
    /// Number of failed report attempts so far.
    pub retry_count: u32,
    /// Description of the last report failure, for operator visibility.
    pub last_error: Option<String>,
    /// When terminal reporting succeeded. Set iff status is synced.
    pub synced_at: Option<DateTime<Utc>>,
    /// Backup outcome, attached once the underlying job finishes.
    pub result: Option<JobResult>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    /// Create a new pending job with a fresh UUID, queued as of now.
    pub fn new(schedule_id: String, schedule_name: String, scheduled_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        QueuedJob {
            id: Uuid::new_v4().to_string(),
            schedule_id,
            schedule_name,
            scheduled_at,
            queued_at: now,
            status: JobStatus::Pending,
            retry_count: 0,
            last_error: None,
            synced_at: None,
            result: None,
            created_at: now,
        }
    }
}

/// Per-status counts plus the oldest pending timestamp.
///
/// Derived on demand for observability; never itself a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueCounts {
    /// Jobs waiting to be reported.
    pub pending: u64,
    /// Jobs claimed by an in-flight reconciliation pass.
    pub syncing: u64,
    /// Jobs successfully reported.
    pub synced: u64,
    /// Jobs whose retry budget is exhausted.
    pub failed: u64,
    /// `scheduled_at` of the oldest pending job, if any.
    pub oldest_pending: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
