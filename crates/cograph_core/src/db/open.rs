//! Connection bootstrap.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a 5s busy timeout.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DB_PATH_ENV: &str = "COGRAPH_STACK_DB_PATH";
const DEFAULT_DB_DIR_NAME: &str = ".cograph";
const DEFAULT_DB_FILE_NAME: &str = "undo_stacks.sqlite3";

/// Opens (or creates) a stack store database file.
///
/// # Side effects
/// - Applies pending migrations.
/// - Emits `db_open` events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with("file", || Connection::open(path))
}

/// Opens the per-user stack store at [`default_db_path`], creating its
/// directory when missing.
pub fn open_default_db() -> DbResult<Connection> {
    let path = default_db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            DbError::Io(format!("cannot create `{}`: {err}", parent.display()))
        })?;
    }
    open_db(path)
}

/// Location of the per-user stack store.
///
/// `COGRAPH_STACK_DB_PATH` wins when set and non-blank; otherwise the file
/// lives under `$HOME/.cograph`, or the temp directory without a home.
pub fn default_db_path() -> PathBuf {
    resolve_default_db_path(
        std::env::var(DEFAULT_DB_PATH_ENV).ok(),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn resolve_default_db_path(override_path: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(raw) = override_path {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    home.filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(DEFAULT_DB_DIR_NAME))
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_DB_FILE_NAME)
}

/// Opens a private in-memory stack store, used by tests and scratch sessions.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let outcome: DbResult<Connection> = opener().map_err(DbError::from).and_then(|mut conn| {
        bootstrap_connection(&mut conn)?;
        Ok(conn)
    });

    match &outcome {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    outcome
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    Ok(())
}
