// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! End-to-end tests for the offline queue: durable store, orchestrator
//! and mock server client wired together the way a host process would.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use stash_core::{JobResult, JobStatus, QueueStore, SqliteStore};

use crate::test_helpers::MockServerClient;
use crate::{AgentConfig, QueueOrchestrator};

fn fast_config() -> AgentConfig {
    AgentConfig {
        server_url: "http://mock".into(),
        capacity: 10,
        max_retries: 3,
        health_interval: Duration::from_millis(10),
        sync_interval: Duration::from_millis(10),
        health_timeout: Duration::from_secs(1),
        report_timeout: Duration::from_secs(1),
        reconnect_sync_timeout: Duration::from_secs(5),
        retention: chrono::Duration::days(7),
    }
}

async fn wait_for(predicate: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn offline_backups_sync_when_server_returns() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("queue.db")).unwrap());
    let client = Arc::new(MockServerClient::new());
    // Long sync interval: the backlog must drain through the
    // reconnection pass alone.
    let config = AgentConfig {
        sync_interval: Duration::from_secs(60),
        ..fast_config()
    };
    let orchestrator = QueueOrchestrator::new(Arc::clone(&store), Arc::clone(&client), config);

    orchestrator.start();

    // Server is down: outcomes pile up locally
    let first = orchestrator.enqueue("nightly", "Nightly", Utc::now()).unwrap();
    orchestrator
        .attach_result(
            &first.id,
            JobResult {
                success: true,
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
                bytes_added: Some(1024),
                files_new: Some(4),
                files_changed: Some(2),
                snapshot_id: Some("feed1234".into()),
                error_message: None,
                repository_id: Some("repo-main".into()),
            },
        )
        .unwrap();
    orchestrator.enqueue("weekly", "Weekly", Utc::now()).unwrap();

    // Let a few probe/sync ticks pass while unreachable
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!orchestrator.is_reachable());
    assert_eq!(orchestrator.status().unwrap().pending_count, 2);
    assert!(client.reported_batches().is_empty());

    // Server comes back: reconnection edge drains the queue
    client.set_healthy(true);
    let draining = Arc::clone(&store);
    wait_for(move || draining.counts().unwrap().synced == 2).await;

    assert_eq!(client.reconnect_notices(), vec![2]);
    let status = orchestrator.status().unwrap();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.synced_count, 2);
    assert!(status.server_reachable);
    assert!(status.last_success_sync.is_some());

    orchestrator.stop().await;
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queue.db");
    let client = Arc::new(MockServerClient::new());

    // First process lifetime: enqueue while offline, then stop
    let job_id = {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let orchestrator =
            QueueOrchestrator::new(Arc::clone(&store), Arc::clone(&client), fast_config());
        orchestrator.start();
        let job = orchestrator.enqueue("nightly", "Nightly", Utc::now()).unwrap();
        orchestrator.stop().await;
        job.id
    };

    // Second lifetime: the job is still pending and syncs once reachable
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let orchestrator =
        QueueOrchestrator::new(Arc::clone(&store), Arc::clone(&client), fast_config());
    assert_eq!(store.get(&job_id).unwrap().status, JobStatus::Pending);

    client.set_healthy(true);
    orchestrator.start();
    let draining = Arc::clone(&store);
    wait_for(move || draining.counts().unwrap().synced == 1).await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn periodic_sync_picks_up_work_queued_while_reachable() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let client = Arc::new(MockServerClient::new());
    client.set_healthy(true);
    let orchestrator =
        QueueOrchestrator::new(Arc::clone(&store), Arc::clone(&client), fast_config());

    orchestrator.start();
    let steady = Arc::clone(&client);
    wait_for(move || steady.health_calls() >= 1).await;

    orchestrator.enqueue("nightly", "Nightly", Utc::now()).unwrap();
    let draining = Arc::clone(&store);
    wait_for(move || draining.counts().unwrap().synced == 1).await;

    orchestrator.stop().await;
}
