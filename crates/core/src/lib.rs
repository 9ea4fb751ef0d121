// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! stash-core: Durable offline queue for the stash backup agent.
//!
//! This crate provides the core data structures and the SQLite-backed
//! durable store used by the stash agent's sync orchestrator.

pub mod error;
pub mod job;
pub mod store;

pub use error::{Error, Result};
pub use job::{JobResult, JobStatus, QueueCounts, QueuedJob};
pub use store::{QueueStore, SqliteStore};
