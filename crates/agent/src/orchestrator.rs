// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! Queue orchestrator: owns connectivity state, enforces capacity, and
//! drives the two periodic background tasks.
//!
//! A health task probes the server on a fixed interval and flips the
//! shared connectivity flag on reachability edges; a sync task reports
//! pending jobs in bulk while the server is reachable and prunes old
//! terminal records after successful passes. Both tasks observe one
//! shutdown signal and are joined on [`QueueOrchestrator::stop`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stash_core::{JobResult, JobStatus, QueueStore, QueuedJob};

use crate::client::{ClientError, ServerClient};
use crate::config::AgentConfig;
use crate::state::Connectivity;

/// Error type for orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The local queue is at capacity; the caller must wait or expand it.
    #[error("backup queue is full ({capacity} jobs pending)")]
    QueueFull {
        /// The configured capacity that was hit.
        capacity: u64,
    },

    /// No network path to the server; resolves itself on reconnection.
    #[error("server is unreachable")]
    ServerUnreachable,

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] stash_core::Error),

    /// The server rejected a request or the request failed in transit.
    #[error("report failed: {0}")]
    Client(#[from] ClientError),
}

/// Result type for orchestrator operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Store aggregate merged with live connectivity and configured capacity.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Jobs waiting to be reported.
    pub pending_count: u64,
    /// Jobs claimed by an in-flight reconciliation pass.
    pub syncing_count: u64,
    /// Jobs successfully reported.
    pub synced_count: u64,
    /// Jobs whose retry budget is exhausted.
    pub failed_count: u64,
    /// `scheduled_at` of the oldest pending job, if any.
    pub oldest_pending: Option<DateTime<Utc>>,
    /// Configured pending-job capacity.
    pub capacity: u64,
    /// Whether the last health probe succeeded.
    pub server_reachable: bool,
    /// When the last health probe completed.
    pub last_health_check: Option<DateTime<Utc>>,
    /// When the last sync pass started.
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// When the last sync pass fully succeeded.
    pub last_success_sync: Option<DateTime<Utc>>,
}

/// Orchestrates the offline backup queue against the central server.
pub struct QueueOrchestrator<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    config: AgentConfig,
    connectivity: Connectivity,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, C> QueueOrchestrator<S, C>
where
    S: QueueStore + 'static,
    C: ServerClient + 'static,
{
    /// Create an orchestrator over the given store and client.
    ///
    /// Background tasks are not running until [`start`](Self::start).
    pub fn new(store: Arc<S>, client: Arc<C>, config: AgentConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        QueueOrchestrator {
            store,
            client,
            config,
            connectivity: Connectivity::new(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Queue a backup outcome for later reporting.
    ///
    /// Fails with [`AgentError::QueueFull`] when the pending count has
    /// reached the configured capacity.
    pub fn enqueue(
        &self,
        schedule_id: impl Into<String>,
        schedule_name: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> AgentResult<QueuedJob> {
        if self.store.pending_count()? >= self.config.capacity {
            return Err(AgentError::QueueFull {
                capacity: self.config.capacity,
            });
        }

        let job = QueuedJob::new(schedule_id.into(), schedule_name.into(), scheduled_at);
        self.store.create(&job)?;
        info!(job_id = %job.id, schedule = %job.schedule_id, "backup queued for later sync");
        Ok(job)
    }

    /// Attach a finished backup's result to a queued job.
    ///
    /// Leaves the job's sync status untouched.
    pub fn attach_result(&self, job_id: &str, result: JobResult) -> AgentResult<QueuedJob> {
        let mut job = self.store.get(job_id)?;
        job.result = Some(result);
        self.store.update(&job)?;
        debug!(job_id = %job.id, "backup result attached");
        Ok(job)
    }

    /// Aggregate queue status for operator display.
    pub fn status(&self) -> AgentResult<QueueStatus> {
        let counts = self.store.counts()?;
        let state = self.connectivity.snapshot();

        Ok(QueueStatus {
            pending_count: counts.pending,
            syncing_count: counts.syncing,
            synced_count: counts.synced,
            failed_count: counts.failed,
            oldest_pending: counts.oldest_pending,
            capacity: self.config.capacity,
            server_reachable: state.reachable,
            last_health_check: state.last_health_check,
            last_sync_attempt: state.last_sync_attempt,
            last_success_sync: state.last_success_sync,
        })
    }

    /// Whether the server was reachable at the last health probe.
    pub fn is_reachable(&self) -> bool {
        self.connectivity.is_reachable()
    }

    /// Run one reconciliation pass now, independent of the periodic task.
    ///
    /// Returns the number of jobs reported, or
    /// [`AgentError::ServerUnreachable`] without touching the store or the
    /// network when connectivity is known-bad.
    pub async fn sync_now(&self) -> AgentResult<usize> {
        sync_pending(
            self.store.as_ref(),
            self.client.as_ref(),
            &self.connectivity,
            self.config.max_retries,
            self.config.report_timeout,
        )
        .await
    }

    /// Start the health and sync tasks. Idempotent while running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }

        tasks.push(tokio::spawn(health_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            self.connectivity.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(sync_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            self.connectivity.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        )));
        info!("queue orchestrator started");
    }

    /// Signal shutdown and wait for both periodic tasks to exit.
    ///
    /// A cycle already in progress finishes first; only the next tick is
    /// skipped.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("queue orchestrator stopped");
    }
}

/// Periodic health probe task.
async fn health_loop<S, C>(
    store: Arc<S>,
    client: Arc<C>,
    connectivity: Connectivity,
    config: AgentConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    S: QueueStore + 'static,
    C: ServerClient + 'static,
{
    let mut ticker = tokio::time::interval(config.health_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                check_server_health(&store, &client, &connectivity, &config).await;
            }
            _ = shutdown.changed() => {
                debug!("health task stopping");
                break;
            }
        }
    }
}

/// Periodic sync task. Prunes old terminal records after successful passes.
async fn sync_loop<S, C>(
    store: Arc<S>,
    client: Arc<C>,
    connectivity: Connectivity,
    config: AgentConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    S: QueueStore + 'static,
    C: ServerClient + 'static,
{
    let mut ticker = tokio::time::interval(config.sync_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sync_cycle(store.as_ref(), client.as_ref(), &connectivity, &config).await;
            }
            _ = shutdown.changed() => {
                debug!("sync task stopping");
                break;
            }
        }
    }
}

/// One probe: network call first, flags written under the lock after.
///
/// On the unreachable-to-reachable edge with a nonzero backlog, sends the
/// reconnection advisory and spawns one detached reconciliation pass so a
/// slow sync never delays the next probe.
async fn check_server_health<S, C>(
    store: &Arc<S>,
    client: &Arc<C>,
    connectivity: &Connectivity,
    config: &AgentConfig,
) where
    S: QueueStore + 'static,
    C: ServerClient + 'static,
{
    let healthy = match client.check_health(config.health_timeout).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "health probe failed");
            false
        }
    };

    let was_healthy = connectivity.set_reachable(healthy, Utc::now());

    if healthy && !was_healthy {
        info!("server reachable again");
        let pending = match store.pending_count() {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "failed to count backlog after reconnect");
                return;
            }
        };
        if pending == 0 {
            return;
        }

        // Best-effort advisory; the sync pass below is what matters.
        if let Err(e) = client.notify_reconnection(pending).await {
            warn!(error = %e, "reconnection notice failed");
        }

        let store = Arc::clone(store);
        let client = Arc::clone(client);
        let connectivity = connectivity.clone();
        let max_retries = config.max_retries;
        let report_timeout = config.report_timeout;
        let overall_timeout = config.reconnect_sync_timeout;
        tokio::spawn(async move {
            let pass = sync_pending(
                store.as_ref(),
                client.as_ref(),
                &connectivity,
                max_retries,
                report_timeout,
            );
            match tokio::time::timeout(overall_timeout, pass).await {
                Ok(Ok(count)) => info!(count, "reconnection sync complete"),
                Ok(Err(e)) => warn!(error = %e, "reconnection sync failed"),
                Err(_) => warn!("reconnection sync timed out"),
            }
        });
    } else if !healthy && was_healthy {
        warn!("server unreachable, queueing backups locally");
    }
}

/// One tick of the periodic sync task.
async fn sync_cycle<S, C>(store: &S, client: &C, connectivity: &Connectivity, config: &AgentConfig)
where
    S: QueueStore,
    C: ServerClient,
{
    if !connectivity.is_reachable() {
        debug!("skipping sync cycle, server unreachable");
        return;
    }

    match sync_pending(
        store,
        client,
        connectivity,
        config.max_retries,
        config.report_timeout,
    )
    .await
    {
        Ok(0) => {}
        Ok(count) => info!(count, "synced queued backups"),
        Err(e) => {
            warn!(error = %e, "sync cycle failed");
            return;
        }
    }

    match store.prune(config.retention) {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "pruned old queue records"),
        Err(e) => warn!(error = %e, "failed to prune old queue records"),
    }
}

/// One reconciliation pass: report every currently pending job in bulk and
/// move each to its next state based on the outcome.
///
/// Safe to run concurrently with another pass: it only acts on records it
/// observed as pending, and every store write is independently atomic.
async fn sync_pending<S, C>(
    store: &S,
    client: &C,
    connectivity: &Connectivity,
    max_retries: u32,
    report_timeout: Duration,
) -> AgentResult<usize>
where
    S: QueueStore + ?Sized,
    C: ServerClient + ?Sized,
{
    if !connectivity.is_reachable() {
        return Err(AgentError::ServerUnreachable);
    }

    connectivity.mark_sync_attempt(Utc::now());

    let mut jobs = store.list_pending()?;
    if jobs.is_empty() {
        return Ok(0);
    }
    debug!(count = jobs.len(), "reporting queued backups");

    for job in &mut jobs {
        job.status = JobStatus::Syncing;
        // A record that cannot be claimed is still reported from its
        // in-memory copy; the next cycle re-reads it from the store.
        if let Err(e) = store.update(job) {
            warn!(job_id = %job.id, error = %e, "failed to mark job syncing");
        }
    }

    match client.report_batch(&jobs, report_timeout).await {
        Ok(()) => {
            let now = Utc::now();
            for job in &mut jobs {
                job.status = JobStatus::Synced;
                job.synced_at = Some(now);
                if let Err(e) = store.update(job) {
                    warn!(job_id = %job.id, error = %e, "failed to mark job synced");
                }
            }
            connectivity.mark_sync_success(now);
            Ok(jobs.len())
        }
        Err(e) => {
            let description = e.to_string();
            for job in &mut jobs {
                job.retry_count += 1;
                job.last_error = Some(description.clone());
                if job.retry_count >= max_retries {
                    job.status = JobStatus::Failed;
                    warn!(
                        job_id = %job.id,
                        retries = job.retry_count,
                        "job exhausted its retry budget"
                    );
                } else {
                    job.status = JobStatus::Pending;
                }
                if let Err(persist_err) = store.update(job) {
                    warn!(job_id = %job.id, error = %persist_err, "failed to record report failure");
                }
            }
            Err(AgentError::Client(e))
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
