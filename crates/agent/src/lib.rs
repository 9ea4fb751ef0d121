// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! stash-agent: Offline sync orchestration for the stash backup agent.
//!
//! Guarantees that every queued backup outcome is eventually reported to
//! the central server, even though the server may be unreachable for
//! arbitrary periods.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌────────────┐
//! │ QueueOrchestrator│────►│ ServerClient │────►│   Server   │
//! │  (periodic tasks)│◄────│   (trait)    │◄────│  (central) │
//! └──────────────────┘     └──────────────┘     └────────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │    QueueStore    │  (durable offline queue, stash-core)
//! └──────────────────┘
//! ```
//!
//! # Features
//!
//! - Durable SQLite-backed queue with capacity enforcement
//! - Periodic health probing with reconnection detection
//! - Bulk reporting with bounded retries per job
//! - Retention pruning of old terminal records
//! - Injectable store and client traits for testing

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod state;

pub use client::{ClientError, ClientResult, HttpServerClient, ServerClient};
pub use config::AgentConfig;
pub use orchestrator::{AgentError, AgentResult, QueueOrchestrator, QueueStatus};
pub use state::{Connectivity, ConnectivityState};

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod integration_tests;
