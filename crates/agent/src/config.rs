// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Configuration for the sync orchestrator.

use std::time::Duration;

/// Configuration for the queue orchestrator.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the central server, e.g. `https://stash.example.com`.
    pub server_url: String,
    /// Maximum number of pending jobs the local queue may hold.
    pub capacity: u64,
    /// Maximum failed report attempts before a job is parked as failed.
    pub max_retries: u32,
    /// Interval between health probes.
    pub health_interval: Duration,
    /// Interval between periodic sync passes.
    pub sync_interval: Duration,
    /// Timeout for a single health probe.
    pub health_timeout: Duration,
    /// Timeout for a bulk report request. Batches may be large.
    pub report_timeout: Duration,
    /// Timeout for the detached sync pass triggered by a reconnection.
    pub reconnect_sync_timeout: Duration,
    /// Age past which terminal (synced/failed) records are pruned.
    pub retention: chrono::Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            server_url: "http://localhost:8080".to_string(),
            capacity: 1000,
            max_retries: 5,
            health_interval: Duration::from_secs(60),
            sync_interval: Duration::from_secs(300),
            health_timeout: Duration::from_secs(10),
            report_timeout: Duration::from_secs(300),
            reconnect_sync_timeout: Duration::from_secs(600),
            retention: chrono::Duration::days(7),
        }
    }
}
