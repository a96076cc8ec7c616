//! `store`: the relational backing store (SQLite via rusqlite).
//!
//! A [`Store`] only remembers the database path; every operation opens its
//! own connection, and multi-row state changes run inside an IMMEDIATE
//! transaction so concurrent approvers serialise on the write lock.
//!
//! ```text
//! departments ─┬─< users >── posts
//!              └─< rules
//! users ──< applications ──< tasks
//!                       └──< events
//! users ──< sessions
//! ```

pub mod applications;
pub mod org;
pub mod rules;
pub mod users;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    parent_id INTEGER REFERENCES departments(id),
    leader_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    department_id INTEGER REFERENCES departments(id),
    post_id INTEGER REFERENCES posts(id),
    password_salt TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    app_type TEXT NOT NULL,
    department_id INTEGER REFERENCES departments(id),
    post_id INTEGER REFERENCES posts(id),
    min_magnitude INTEGER,
    priority INTEGER NOT NULL DEFAULT 0,
    mode TEXT NOT NULL,
    approvers TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    applicant_id INTEGER NOT NULL REFERENCES users(id),
    app_type TEXT NOT NULL,
    title TEXT NOT NULL,
    reason TEXT NOT NULL,
    detail TEXT NOT NULL,
    magnitude INTEGER NOT NULL,
    status TEXT NOT NULL,
    rule_id INTEGER REFERENCES rules(id) ON DELETE SET NULL,
    mode TEXT,
    plan TEXT NOT NULL DEFAULT '[]',
    round INTEGER NOT NULL DEFAULT 0,
    current_step INTEGER NOT NULL DEFAULT 0,
    total_steps INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    submitted_at TEXT,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
    round INTEGER NOT NULL,
    step INTEGER NOT NULL,
    approver_id INTEGER NOT NULL REFERENCES users(id),
    status TEXT NOT NULL,
    comment TEXT,
    created_at TEXT NOT NULL,
    acted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_approver ON tasks(approver_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_application ON tasks(application_id, round, step);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
    actor_id INTEGER REFERENCES users(id),
    action TEXT NOT NULL,
    comment TEXT,
    created_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";

#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (and if needed create) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Store(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let store = Self { db_path: db_path.to_path_buf() };
        store.init_db()?;
        info!(db_path = %store.db_path.display(), "store ready");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// A fresh connection with the per-connection pragmas applied.
    pub fn conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Store(format!("open {}: {e}", self.db_path.display())))?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Store(format!("set foreign_keys ON: {e}")))?;
        conn.busy_timeout(Duration::from_millis(5000))
            .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

        Ok(conn)
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| AppError::Store(format!("initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }
}

/// Begin a write transaction that takes the database lock up front.
pub(crate) fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>, AppError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| AppError::Store(format!("begin tx: {e}")))
}

pub(crate) fn commit(tx: Transaction<'_>) -> Result<(), AppError> {
    tx.commit().map_err(|e| AppError::Store(format!("commit: {e}")))
}

/// Map a rusqlite error to [`AppError`]; constraint violations become
/// [`AppError::Conflict`].
pub(crate) fn store_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            AppError::Conflict(format!("{context}: {e}"))
        }
        _ => AppError::Store(format!("{context}: {e}")),
    }
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
