//! SQLite-based execution storage.
//!
//! Provides persistent storage for:
//! - The active execution and its current timer (JSON in a key-value table)
//! - History of finished and discarded runs

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::data_dir;
use super::persistence::ExecutionPersistence;
use crate::error::PersistenceError;
use crate::model::{ActiveExecution, ActivityTimerState, RunOutcome, RunRecord};

const ACTIVE_EXECUTION_KEY: &str = "active_execution";
const ACTIVE_TIMER_KEY: &str = "active_timer";

/// SQLite database for execution state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/loopkeeper/<file>`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open(file_name: &str) -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join(file_name))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "opened execution database");
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id             TEXT NOT NULL UNIQUE,
                loop_id            TEXT NOT NULL,
                loop_title         TEXT NOT NULL DEFAULT '',
                started_at         TEXT NOT NULL,
                finished_at        TEXT NOT NULL,
                time_spent_seconds INTEGER NOT NULL,
                completed_count    INTEGER NOT NULL,
                total_activities   INTEGER NOT NULL,
                outcome            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at);
            CREATE INDEX IF NOT EXISTS idx_runs_loop_id ON runs(loop_id);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        kv_set_on(&self.conn(), key, value)
    }

    /// Remove a key from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<(), PersistenceError> {
        kv_delete_on(&self.conn(), key)
    }

    fn put_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: Option<&T>,
    ) -> Result<(), PersistenceError> {
        put_json_on(&self.conn(), key, value)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError> {
        match self.kv_get(key)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| PersistenceError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, PersistenceError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT run_id, loop_id, loop_title, started_at, finished_at, time_spent_seconds,
                    completed_count, total_activities, outcome
             FROM runs
             ORDER BY finished_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (run_id, loop_id, loop_title, started, finished, spent, completed, total, outcome) =
                row?;
            runs.push(RunRecord {
                run_id,
                loop_id,
                loop_title,
                started_at: parse_datetime(&started)?,
                finished_at: parse_datetime(&finished)?,
                time_spent_seconds: spent.max(0) as u64,
                completed_count: completed.max(0) as usize,
                total_activities: total.max(0) as usize,
                outcome: RunOutcome::parse(&outcome),
            });
        }
        Ok(runs)
    }
}

fn kv_set_on(conn: &Connection, key: &str, value: &str) -> Result<(), PersistenceError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn kv_delete_on(conn: &Connection, key: &str) -> Result<(), PersistenceError> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
}

fn put_json_on<T: serde::Serialize>(
    conn: &Connection,
    key: &str,
    value: Option<&T>,
) -> Result<(), PersistenceError> {
    match value {
        Some(value) => {
            let json =
                serde_json::to_string(value).map_err(|e| PersistenceError::Encode(e.to_string()))?;
            kv_set_on(conn, key, &json)
        }
        None => kv_delete_on(conn, key),
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Decode {
            key: "runs".into(),
            message: e.to_string(),
        })
}

impl ExecutionPersistence for Database {
    fn save_active_execution(
        &self,
        execution: Option<&ActiveExecution>,
    ) -> Result<(), PersistenceError> {
        self.put_json(ACTIVE_EXECUTION_KEY, execution)
    }

    fn load_active_execution(&self) -> Result<Option<ActiveExecution>, PersistenceError> {
        self.get_json(ACTIVE_EXECUTION_KEY)
    }

    fn save_timer(&self, timer: Option<&ActivityTimerState>) -> Result<(), PersistenceError> {
        self.put_json(ACTIVE_TIMER_KEY, timer)
    }

    fn load_timer(&self) -> Result<Option<ActivityTimerState>, PersistenceError> {
        self.get_json(ACTIVE_TIMER_KEY)
    }

    /// Both records in one transaction, so a restart never sees one without the other.
    fn save_checkpoint(
        &self,
        execution: Option<&ActiveExecution>,
        timer: Option<&ActivityTimerState>,
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        put_json_on(&tx, ACTIVE_EXECUTION_KEY, execution)?;
        put_json_on(&tx, ACTIVE_TIMER_KEY, timer)?;
        tx.commit()?;
        Ok(())
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO runs (run_id, loop_id, loop_title, started_at, finished_at,
                 time_spent_seconds, completed_count, total_activities, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.run_id,
                record.loop_id,
                record.loop_title,
                record.started_at.to_rfc3339(),
                record.finished_at.to_rfc3339(),
                record.time_spent_seconds as i64,
                record.completed_count as i64,
                record.total_activities as i64,
                record.outcome.as_str(),
            ],
        )?;
        Ok(())
    }
}
