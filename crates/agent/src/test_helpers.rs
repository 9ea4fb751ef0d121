// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Shared test helpers for agent tests.

#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use stash_core::QueuedJob;

use crate::client::{ClientError, ClientResult, ServerClient};

/// Mock server client for testing without a network.
///
/// All knobs use interior mutability so a test can keep an `Arc` clone
/// and flip behavior while the orchestrator holds the other clone.
#[derive(Default)]
pub struct MockServerClient {
    healthy: AtomicBool,
    fail_reports: AtomicBool,
    health_calls: AtomicUsize,
    /// Batches that were reported, as lists of job ids.
    reported: Mutex<Vec<Vec<String>>>,
    /// Queued counts passed to notify_reconnection.
    reconnects: Mutex<Vec<u64>>,
}

impl MockServerClient {
    pub fn new() -> Self {
        MockServerClient::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::SeqCst);
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn reported_batches(&self) -> Vec<Vec<String>> {
        self.reported.lock().unwrap().clone()
    }

    pub fn reconnect_notices(&self) -> Vec<u64> {
        self.reconnects.lock().unwrap().clone()
    }
}

impl ServerClient for MockServerClient {
    fn check_health(
        &self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ClientError::Rejected {
                    status: 503,
                    body: "mock server down".into(),
                })
            }
        })
    }

    fn report_batch<'a>(
        &'a self,
        jobs: &'a [QueuedJob],
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_reports.load(Ordering::SeqCst) {
                return Err(ClientError::Rejected {
                    status: 500,
                    body: "mock report failure".into(),
                });
            }
            let ids = jobs.iter().map(|j| j.id.clone()).collect();
            self.reported.lock().unwrap().push(ids);
            Ok(())
        })
    }

    fn notify_reconnection(
        &self,
        queued_count: u64,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.reconnects.lock().unwrap().push(queued_count);
            Ok(())
        })
    }
}
