// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! HTTP client for the central backup server.
//!
//! The [`ServerClient`] trait abstracts the server boundary so the
//! orchestrator can be tested against a mock without a network. The
//! production implementation, [`HttpServerClient`], talks to the server's
//! agent endpoints over authenticated HTTPS (transport setup is the
//! host's concern).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stash_core::QueuedJob;

/// Error type for server client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be completed (connect, timeout, transport).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },
}

/// Result type for server client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Client contract toward the central server.
///
/// All calls take an explicit timeout (or use a short default), so no
/// network operation is unbounded.
pub trait ServerClient: Send + Sync {
    /// Bounded-latency health probe. Reachable iff the server answers 200.
    fn check_health(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>>;

    /// Report a batch of queued jobs in one request.
    ///
    /// Succeeds only if the server accepts the entire batch; there is no
    /// partial acknowledgment. An empty batch is a no-op success.
    fn report_batch<'a>(
        &'a self,
        jobs: &'a [QueuedJob],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + 'a>>;

    /// Best-effort advisory that this agent just regained connectivity
    /// with `queued_count` jobs backlogged.
    fn notify_reconnection(
        &self,
        queued_count: u64,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>>;
}

/// One row of a batch report, flattened for the wire.
#[derive(Debug, Serialize)]
pub struct QueuedBackupReport {
    pub id: String,
    pub schedule_id: String,
    pub schedule_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    /// The attached result's success flag; false while no result is
    /// attached yet (job queued but not completed).
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_added: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_new: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

impl From<&QueuedJob> for QueuedBackupReport {
    fn from(job: &QueuedJob) -> Self {
        let result = job.result.as_ref();
        QueuedBackupReport {
            id: job.id.clone(),
            schedule_id: job.schedule_id.clone(),
            schedule_name: job.schedule_name.clone(),
            scheduled_at: job.scheduled_at,
            queued_at: job.queued_at,
            success: result.is_some_and(|r| r.success),
            started_at: result.and_then(|r| r.started_at),
            completed_at: result.and_then(|r| r.completed_at),
            bytes_added: result.and_then(|r| r.bytes_added),
            files_new: result.and_then(|r| r.files_new),
            files_changed: result.and_then(|r| r.files_changed),
            snapshot_id: result.and_then(|r| r.snapshot_id.clone()),
            error_message: result.and_then(|r| r.error_message.clone()),
            repository_id: result.and_then(|r| r.repository_id.clone()),
        }
    }
}

/// Body of `POST /agent/queued-backups`.
#[derive(Debug, Serialize)]
pub struct ReportBatchRequest {
    pub backups: Vec<QueuedBackupReport>,
}

/// Body of `POST /agent/reconnect`.
#[derive(Debug, Serialize)]
struct ReconnectNotice {
    queued_count: u64,
}

/// Fallback request timeout for calls without an explicit bound.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shorten an error body to a loggable excerpt.
///
/// Cuts on a char boundary; the server controls the body, so byte 200
/// may fall inside a multi-byte character.
fn body_excerpt(mut body: String) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

/// [`ServerClient`] implementation over HTTP.
pub struct HttpServerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpServerClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(HttpServerClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to [`ClientError::Rejected`] with a
    /// short body excerpt for the log.
    async fn check_response(response: reqwest::Response) -> ClientResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = body_excerpt(response.text().await.unwrap_or_default());
        Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl ServerClient for HttpServerClient {
    fn check_health(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .get(self.url("/health"))
                .timeout(timeout)
                .send()
                .await?;

            // Only a clean 200 counts as reachable.
            let status = response.status();
            if status == reqwest::StatusCode::OK {
                Ok(())
            } else {
                let body = body_excerpt(response.text().await.unwrap_or_default());
                Err(ClientError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        })
    }

    fn report_batch<'a>(
        &'a self,
        jobs: &'a [QueuedJob],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if jobs.is_empty() {
                return Ok(());
            }

            let request = ReportBatchRequest {
                backups: jobs.iter().map(QueuedBackupReport::from).collect(),
            };

            let response = self
                .http
                .post(self.url("/agent/queued-backups"))
                .timeout(timeout)
                .json(&request)
                .send()
                .await?;

            Self::check_response(response).await
        })
    }

    fn notify_reconnection(
        &self,
        queued_count: u64,
    ) -> Pin<Box<dyn Future<Output = ClientResult<()>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.url("/agent/reconnect"))
                .json(&ReconnectNotice { queued_count })
                .send()
                .await?;

            Self::check_response(response).await
        })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
