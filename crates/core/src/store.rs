// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Stash Contributors

//! SQLite-backed durable store for queued backup jobs.
//!
//! The [`QueueStore`] trait is the seam the orchestrator consumes; tests
//! and embedders can substitute their own implementation. [`SqliteStore`]
//! is the production implementation. All mutating operations commit before
//! returning, so a caller observing success may assume the write survives
//! a process crash.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::job::{JobStatus, QueueCounts, QueuedJob};

/// SQL schema for the offline backup queue.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queued_backups (
    id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL,
    schedule_name TEXT NOT NULL,
    scheduled_at TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    synced_at TEXT,
    backup_result TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queued_backups_status ON queued_backups(status);
CREATE INDEX IF NOT EXISTS idx_queued_backups_scheduled_at ON queued_backups(scheduled_at);
CREATE INDEX IF NOT EXISTS idx_queued_backups_synced_at ON queued_backups(synced_at);
"#;

/// Columns selected for full-row reads, in [`job_from_row`] order.
const JOB_COLUMNS: &str = "id, schedule_id, schedule_name, scheduled_at, queued_at, \
     status, retry_count, last_error, synced_at, backup_result, created_at";

/// Durable CRUD and aggregate query contract for the backup queue.
///
/// All operations are synchronous and safe to call from multiple
/// concurrent callers.
pub trait QueueStore: Send + Sync {
    /// Insert a new record. Fails with [`Error::DuplicateJob`] on id collision.
    fn create(&self, job: &QueuedJob) -> Result<()>;

    /// Fetch a record by id. Fails with [`Error::JobNotFound`] if absent.
    fn get(&self, id: &str) -> Result<QueuedJob>;

    /// Replace all mutable fields of a record by id, atomically.
    ///
    /// Fails with [`Error::JobNotFound`] if the id does not exist.
    fn update(&self, job: &QueuedJob) -> Result<()>;

    /// Delete a record. Fails with [`Error::JobNotFound`] if absent.
    fn delete(&self, id: &str) -> Result<()>;

    /// All pending records, oldest `scheduled_at` first.
    fn list_pending(&self) -> Result<Vec<QueuedJob>>;

    /// All records, most recently queued first.
    fn list_all(&self) -> Result<Vec<QueuedJob>>;

    /// Number of pending records.
    ///
    /// Records already claimed for syncing are excluded; capacity
    /// enforcement only counts work not yet picked up.
    fn pending_count(&self) -> Result<u64>;

    /// Aggregate counts per status plus the oldest pending timestamp.
    fn counts(&self) -> Result<QueueCounts>;

    /// Delete terminal (synced/failed) records queued before
    /// `now - older_than`. Returns the number of rows removed.
    fn prune(&self, older_than: Duration) -> Result<u64>;
}

/// Parse a string value from the database, returning a rusqlite error on
/// parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Map a full `queued_backups` row to a [`QueuedJob`].
fn job_from_row(row: &Row<'_>) -> std::result::Result<QueuedJob, rusqlite::Error> {
    let scheduled_str: String = row.get(3)?;
    let queued_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let retry_count: i64 = row.get(6)?;
    let synced_str: Option<String> = row.get(8)?;
    let result_json: Option<String> = row.get(9)?;
    let created_str: String = row.get(10)?;

    let synced_at = match synced_str {
        None => None,
        Some(s) => Some(parse_timestamp(&s, "synced_at")?),
    };

    let result = match result_json {
        None => None,
        Some(s) => Some(serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?),
    };

    Ok(QueuedJob {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        schedule_name: row.get(2)?,
        scheduled_at: parse_timestamp(&scheduled_str, "scheduled_at")?,
        queued_at: parse_timestamp(&queued_str, "queued_at")?,
        status: parse_db(&status_str, "status")?,
        retry_count: retry_count.max(0) as u32,
        last_error: row.get(7)?,
        synced_at,
        result,
        created_at: parse_timestamp(&created_str, "created_at")?,
    })
}

/// Apply the schema to a database connection. Idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// SQLite-backed [`QueueStore`] implementation.
///
/// The connection is guarded by a mutex so one store instance can be
/// shared by the periodic tasks and foreground callers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a store at the given path, creating and migrating if needed.
    ///
    /// Any record persisted as `syncing` by a previous process is reset
    /// to `pending`: an in-flight claim does not survive a restart.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;

        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.recover_interrupted()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing). Runs the same migration
    /// and recovery steps as [`open`](Self::open).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.recover_interrupted()?;
        Ok(store)
    }

    /// Reset records stuck in `syncing` back to `pending`.
    ///
    /// Returns the number of records reset. Called on open; also available
    /// to hosts that manage recovery themselves.
    pub fn recover_interrupted(&self) -> Result<u64> {
        let conn = self.lock()?;
        let reset = conn.execute(
            "UPDATE queued_backups SET status = 'pending' WHERE status = 'syncing'",
            [],
        )?;
        Ok(reset as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    fn list_where(&self, sql: &str) -> Result<Vec<QueuedJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], job_from_row)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }
}

impl QueueStore for SqliteStore {
    fn create(&self, job: &QueuedJob) -> Result<()> {
        let result_json = match &job.result {
            None => None,
            Some(r) => Some(serde_json::to_string(r)?),
        };

        let inserted = self.lock()?.execute(
            "INSERT INTO queued_backups (id, schedule_id, schedule_name, scheduled_at,
             queued_at, status, retry_count, last_error, synced_at, backup_result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id,
                job.schedule_id,
                job.schedule_name,
                job.scheduled_at.to_rfc3339(),
                job.queued_at.to_rfc3339(),
                job.status.as_str(),
                job.retry_count,
                job.last_error,
                job.synced_at.map(|t| t.to_rfc3339()),
                result_json,
                job.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateJob(job.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> Result<QueuedJob> {
        let job = self
            .lock()?
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM queued_backups WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()?;

        job.ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    fn update(&self, job: &QueuedJob) -> Result<()> {
        let result_json = match &job.result {
            None => None,
            Some(r) => Some(serde_json::to_string(r)?),
        };

        // One statement covering every mutable field, including the
        // serialized result: a crash mid-update cannot leave the row
        // split between old and new payloads.
        let affected = self.lock()?.execute(
            "UPDATE queued_backups
             SET schedule_id = ?1, schedule_name = ?2, scheduled_at = ?3, queued_at = ?4,
                 status = ?5, retry_count = ?6, last_error = ?7, synced_at = ?8,
                 backup_result = ?9
             WHERE id = ?10",
            params![
                job.schedule_id,
                job.schedule_name,
                job.scheduled_at.to_rfc3339(),
                job.queued_at.to_rfc3339(),
                job.status.as_str(),
                job.retry_count,
                job.last_error,
                job.synced_at.map(|t| t.to_rfc3339()),
                result_json,
                job.id,
            ],
        )?;

        if affected == 0 {
            return Err(Error::JobNotFound(job.id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let affected = self
            .lock()?
            .execute("DELETE FROM queued_backups WHERE id = ?1", params![id])?;

        if affected == 0 {
            return Err(Error::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<QueuedJob>> {
        // Oldest scheduled work first, so early jobs are not starved
        // under sustained backlog.
        self.list_where(&format!(
            "SELECT {JOB_COLUMNS} FROM queued_backups
             WHERE status = 'pending' ORDER BY scheduled_at ASC"
        ))
    }

    fn list_all(&self) -> Result<Vec<QueuedJob>> {
        self.list_where(&format!(
            "SELECT {JOB_COLUMNS} FROM queued_backups ORDER BY queued_at DESC"
        ))
    }

    fn pending_count(&self) -> Result<u64> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM queued_backups WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn counts(&self) -> Result<QueueCounts> {
        let conn = self.lock()?;
        let mut counts = QueueCounts::default();

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM queued_backups GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match parse_db::<JobStatus>(&status, "status")? {
                JobStatus::Pending => counts.pending = count,
                JobStatus::Syncing => counts.syncing = count,
                JobStatus::Synced => counts.synced = count,
                JobStatus::Failed => counts.failed = count,
            }
        }

        let oldest: Option<String> = conn.query_row(
            "SELECT MIN(scheduled_at) FROM queued_backups WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        counts.oldest_pending = match oldest {
            None => None,
            Some(s) => Some(parse_timestamp(&s, "scheduled_at")?),
        };

        Ok(counts)
    }

    fn prune(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let removed = self.lock()?.execute(
            "DELETE FROM queued_backups
             WHERE status IN ('synced', 'failed') AND queued_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
