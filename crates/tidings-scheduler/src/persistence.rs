//! SQLite-backed job store — survives restarts.
//!
//! One row per registered job; fire rules and thread snapshots serialize as
//! JSON columns. A second table carries the per-thread running flag.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tidings_core::{Result, TidingsError};

use crate::registry::{ScheduledJob, TriggerKind};
use crate::store::JobStore;
use crate::trigger::FireRule;

/// SQLite job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open or create the store database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| TidingsError::Store(format!("DB open: {e}")))?;

        // WAL for concurrent readers (status endpoint vs. tick loop).
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, for tests that want real SQL.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TidingsError::Store(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS scheduler_jobs (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                trigger_kind TEXT NOT NULL,      -- 'interval_mode' | 'daily_mode'
                rule TEXT NOT NULL,              -- JSON FireRule
                thread TEXT NOT NULL,            -- JSON Thread definition
                next_run TEXT,
                last_run TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS thread_state (
                thread_id TEXT PRIMARY KEY,
                running INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| TidingsError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TidingsError::Store(format!("Lock: {e}")))
    }
}

impl JobStore for SqliteJobStore {
    fn save(&self, jobs: &[ScheduledJob]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| TidingsError::Store(format!("Begin: {e}")))?;

        // Wholesale rewrite — the registry owns the authoritative set.
        tx.execute("DELETE FROM scheduler_jobs", [])
            .map_err(|e| TidingsError::Store(format!("Clear: {e}")))?;

        for job in jobs {
            let rule = serde_json::to_string(&job.rule)?;
            let thread = serde_json::to_string(&job.thread)?;
            let kind = serde_json::to_string(&job.trigger_kind)?;
            tx.execute(
                "INSERT INTO scheduler_jobs
                   (id, thread_id, trigger_kind, rule, thread,
                    next_run, last_run, run_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    job.id,
                    job.thread_id,
                    kind,
                    rule,
                    thread,
                    job.next_run.map(|t| t.to_rfc3339()),
                    job.last_run.map(|t| t.to_rfc3339()),
                    job.run_count,
                    job.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| TidingsError::Store(format!("Insert job {}: {e}", job.id)))?;
        }

        tx.commit()
            .map_err(|e| TidingsError::Store(format!("Commit: {e}")))?;
        tracing::debug!("💾 Saved {} job(s)", jobs.len());
        Ok(())
    }

    fn load(&self) -> Result<Vec<ScheduledJob>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, thread_id, trigger_kind, rule, thread,
                        next_run, last_run, run_count, created_at
                 FROM scheduler_jobs ORDER BY id",
            )
            .map_err(|e| TidingsError::Store(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .map_err(|e| TidingsError::Store(format!("Query: {e}")))?;

        let mut jobs = Vec::new();
        for row in rows {
            let (id, thread_id, kind, rule, thread, next_run, last_run, run_count, created_at) =
                row.map_err(|e| TidingsError::Store(format!("Row: {e}")))?;
            let trigger_kind: TriggerKind = serde_json::from_str(&kind)?;
            let rule: FireRule = serde_json::from_str(&rule)?;
            let thread = serde_json::from_str(&thread)?;
            jobs.push(ScheduledJob {
                id,
                thread_id,
                trigger_kind,
                rule,
                thread,
                next_run: parse_ts(next_run.as_deref()),
                last_run: parse_ts(last_run.as_deref()),
                run_count,
                created_at: parse_ts(Some(&created_at)).unwrap_or_else(Utc::now),
            });
        }
        Ok(jobs)
    }

    fn set_running(&self, thread_id: &str, running: bool) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO thread_state (thread_id, running, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET
                   running = excluded.running, updated_at = excluded.updated_at",
                params![thread_id, running as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| TidingsError::Store(format!("Set running: {e}")))?;
        Ok(())
    }

    fn is_running(&self, thread_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT running FROM thread_state WHERE thread_id = ?1")
            .map_err(|e| TidingsError::Store(format!("Prepare: {e}")))?;
        let running: Option<i64> = stmt
            .query_row(params![thread_id], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(TidingsError::Store(format!("Query: {other}"))),
            })?;
        Ok(running.unwrap_or(0) != 0)
    }
}

fn parse_ts(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
