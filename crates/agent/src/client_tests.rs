// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_helpers::MockServerClient;
use stash_core::{JobResult, QueuedJob};

fn job_without_result() -> QueuedJob {
    QueuedJob::new("sched-1".into(), "Nightly".into(), Utc::now())
}

fn job_with_result() -> QueuedJob {
    let mut job = job_without_result();
    job.result = Some(JobResult {
        success: true,
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
        bytes_added: Some(2048),
        files_new: Some(3),
        files_changed: Some(1),
        snapshot_id: Some("deadbeef".into()),
        error_message: None,
        repository_id: Some("repo-1".into()),
    });
    job
}

#[test]
fn report_without_result_defaults_to_unsuccessful() {
    let report = QueuedBackupReport::from(&job_without_result());

    assert!(!report.success);
    assert!(report.snapshot_id.is_none());
    assert!(report.bytes_added.is_none());
}

#[test]
fn report_copies_attached_result_fields() {
    let job = job_with_result();
    let report = QueuedBackupReport::from(&job);

    assert!(report.success);
    assert_eq!(report.id, job.id);
    assert_eq!(report.schedule_id, "sched-1");
    assert_eq!(report.bytes_added, Some(2048));
    assert_eq!(report.snapshot_id.as_deref(), Some("deadbeef"));
    assert_eq!(report.repository_id.as_deref(), Some("repo-1"));
}

#[test]
fn batch_body_wraps_reports_in_backups_array() {
    let request = ReportBatchRequest {
        backups: vec![QueuedBackupReport::from(&job_with_result())],
    };

    let json = serde_json::to_value(&request).unwrap();
    let backups = json.get("backups").unwrap().as_array().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].get("success").unwrap(), true);
    assert_eq!(backups[0].get("schedule_name").unwrap(), "Nightly");
}

#[test]
fn batch_body_omits_absent_result_fields() {
    let request = ReportBatchRequest {
        backups: vec![QueuedBackupReport::from(&job_without_result())],
    };

    let json = serde_json::to_value(&request).unwrap();
    let row = &json.get("backups").unwrap().as_array().unwrap()[0];
    assert!(row.get("snapshot_id").is_none());
    assert!(row.get("error_message").is_none());
    assert_eq!(row.get("success").unwrap(), false);
}

#[test]
fn reconnect_notice_body() {
    let json = serde_json::to_value(ReconnectNotice { queued_count: 7 }).unwrap();
    assert_eq!(json.get("queued_count").unwrap(), 7);
}

#[test]
fn body_excerpt_cuts_on_char_boundary() {
    // Byte 200 lands inside the two-byte 'é'; the cut must not split it.
    let body = format!("{}é and more", "a".repeat(199));
    let excerpt = body_excerpt(body);
    assert_eq!(excerpt.len(), 199);
    assert!(excerpt.chars().all(|c| c == 'a'));

    let multibyte = "é".repeat(150);
    let excerpt = body_excerpt(multibyte);
    assert_eq!(excerpt, "é".repeat(100));
}

#[test]
fn body_excerpt_keeps_short_bodies_whole() {
    assert_eq!(body_excerpt("server on fire".into()), "server on fire");
    assert_eq!(body_excerpt(String::new()), "");
}

#[test]
fn http_client_trims_trailing_slash() {
    let client = HttpServerClient::new("https://stash.example.com/").unwrap();
    assert_eq!(client.url("/health"), "https://stash.example.com/health");
    assert_eq!(
        client.url("/agent/queued-backups"),
        "https://stash.example.com/agent/queued-backups"
    );
}

#[tokio::test]
async fn mock_client_empty_batch_ok() {
    let client = MockServerClient::new();
    client
        .report_batch(&[], Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn mock_client_health_toggle() {
    let client = MockServerClient::new();
    assert!(client.check_health(Duration::from_secs(1)).await.is_err());

    client.set_healthy(true);
    client.check_health(Duration::from_secs(1)).await.unwrap();
    assert_eq!(client.health_calls(), 2);
}
