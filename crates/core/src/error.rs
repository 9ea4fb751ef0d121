// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Error types for stash-core operations.

use thiserror::Error;

/// All possible errors that can occur in stash-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("queued job not found: {0}")]
    JobNotFound(String),

    #[error("queued job already exists: {0}")]
    DuplicateJob(String),

    #[error("invalid job status: '{0}'\n  hint: valid statuses are: pending, syncing, synced, failed")]
    InvalidStatus(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// A specialized Result type for stash-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
