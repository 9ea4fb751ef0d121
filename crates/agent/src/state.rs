// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Shared connectivity state.
//!
//! Process-local, in-memory only. Each orchestrator instance owns its own
//! [`Connectivity`] handle; there is no global state, so instances in
//! tests are fully independent. The lock is only ever taken around plain
//! field reads and writes, never across a network call.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connectivity flags and timestamps, updated by the health task and read
/// by the sync task and status queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectivityState {
    /// Whether the last health probe succeeded. Starts unreachable.
    pub reachable: bool,
    /// When the last health probe completed.
    pub last_health_check: Option<DateTime<Utc>>,
    /// When the last sync pass started.
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// When the last sync pass fully succeeded.
    pub last_success_sync: Option<DateTime<Utc>>,
}

/// Cloneable handle over the shared connectivity state.
///
/// Readers proceed concurrently; the health task's writes are exclusive.
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    inner: Arc<RwLock<ConnectivityState>>,
}

impl Connectivity {
    /// Create a fresh handle, initialized unreachable.
    pub fn new() -> Self {
        Connectivity::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ConnectivityState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the server was reachable at the last probe.
    pub fn is_reachable(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reachable
    }

    /// Record a health probe outcome. Returns the previous reachability,
    /// so the caller can detect a reconnection edge.
    pub fn set_reachable(&self, reachable: bool, now: DateTime<Utc>) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let was = state.reachable;
        state.reachable = reachable;
        state.last_health_check = Some(now);
        was
    }

    /// Record the start of a sync pass.
    pub fn mark_sync_attempt(&self, now: DateTime<Utc>) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.last_sync_attempt = Some(now);
    }

    /// Record a fully successful sync pass.
    pub fn mark_sync_success(&self, now: DateTime<Utc>) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.last_success_sync = Some(now);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
