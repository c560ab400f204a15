use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::domain::{AssignmentStatus, ASSIGNABLE_SUBMISSION_STATUSES};
use crate::config::DatabaseConfig;

/// Schema revision written by [`Database::bootstrap`].
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS faculty (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    max_capacity INTEGER NOT NULL CHECK (max_capacity BETWEEN 1 AND 100),
    is_available INTEGER NOT NULL DEFAULT 1,
    current_load INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS submissions (
    id           TEXT PRIMARY KEY,
    candidate    TEXT NOT NULL DEFAULT '',
    course       TEXT NOT NULL,
    level        TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    status       TEXT NOT NULL,
    weight       INTEGER NOT NULL DEFAULT 1 CHECK (weight >= 1)
);

CREATE TABLE IF NOT EXISTS assignments (
    submission_id      TEXT PRIMARY KEY REFERENCES submissions(id),
    faculty_id         TEXT NOT NULL REFERENCES faculty(id),
    status             TEXT NOT NULL
                       CHECK (status IN ('pending', 'assigned', 'in_progress', 'evaluated')),
    assigned_at        TEXT NOT NULL,
    version            INTEGER NOT NULL DEFAULT 1,
    locked_by          TEXT,
    locked_at          TEXT,
    reallocation_count INTEGER NOT NULL DEFAULT 0,
    submission_weight  INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_assignments_faculty_status
    ON assignments (faculty_id, status);

CREATE TABLE IF NOT EXISTS assignment_log (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id   TEXT NOT NULL,
    action_type     TEXT NOT NULL,
    from_faculty_id TEXT,
    to_faculty_id   TEXT,
    admin_id        TEXT,
    notes           TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assignment_log_created ON assignment_log (created_at);
CREATE INDEX IF NOT EXISTS idx_assignment_log_submission ON assignment_log (submission_id);

CREATE TRIGGER IF NOT EXISTS assignment_log_no_update
BEFORE UPDATE ON assignment_log
BEGIN
    SELECT RAISE(ABORT, 'assignment_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS assignment_log_no_delete
BEFORE DELETE ON assignment_log
BEGIN
    SELECT RAISE(ABORT, 'assignment_log is append-only');
END;
"#;

/// Failures raised by the SQLite layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection poisoned: {0}")]
    Poisoned(String),
}

/// Shared handle to the relational store.
///
/// All writers go through [`Database::write`], which opens an IMMEDIATE transaction: SQLite
/// takes its write lock before the first read, so two coordinator calls never interleave
/// and every read inside the closure is a read-for-update.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        Self::from_connection(conn, Duration::from_millis(config.busy_timeout_ms))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&DatabaseConfig::in_memory())
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(busy_timeout)?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA)?;
        let applied: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        if applied.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![SCHEMA_VERSION, encode_timestamp(&Utc::now())],
            )?;
            tracing::info!(version = SCHEMA_VERSION, "assignment schema created");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|err| StoreError::Poisoned(err.to_string()))
    }

    /// Runs `op` inside one write transaction. The transaction commits only when `op`
    /// returns `Ok`; any error rolls every statement back.
    pub fn write<T, E>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = op(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Runs a read-only query. Readers may observe a snapshot that is stale by the time
    /// the response is rendered.
    pub fn read<T, E>(&self, op: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        op(&conn)
    }

    pub fn schema_version(&self) -> Result<Option<i64>, StoreError> {
        self.read(|conn| {
            let version = conn
                .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                    row.get::<_, Option<i64>>(0)
                })
                .optional()?
                .flatten();
            Ok(version)
        })
    }
}

/// Fixed-width UTC form so lexical order in SQL matches chronological order.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(index: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

pub(crate) fn decode_optional_timestamp(
    index: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| decode_timestamp(index, value)).transpose()
}

/// Maps a stored label onto a domain enum, reporting the column on failure.
pub(crate) fn decode_label<T>(index: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

/// Renders string constants as a SQL `IN` list such as `('pending', 'queued')`.
pub(crate) fn sql_in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .into_iter()
        .map(|value| format!("'{}'", value.replace('\'', "''")))
        .collect();
    format!("({})", quoted.join(", "))
}

pub(crate) fn status_list(statuses: &[AssignmentStatus]) -> String {
    sql_in_list(statuses.iter().map(|status| status.as_str()))
}

/// `IN` list of assignment statuses that count toward load.
pub(crate) fn active_statuses() -> String {
    status_list(&AssignmentStatus::ACTIVE)
}

/// `IN` list of submission statuses eligible for routing.
pub(crate) fn assignable_submission_statuses() -> String {
    sql_in_list(ASSIGNABLE_SUBMISSION_STATUSES)
}
