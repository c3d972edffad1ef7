//! Undo/redo stack repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist named pairs of undo and redo stacks of opaque edit records.
//! - Expose explicit transactions spanning several stack calls.
//!
//! # Invariants
//! - Each `(stack_name, role)` is a total order by `entry_id`; pop and peek
//!   address the highest id (LIFO).
//! - Records are stored and returned as text; the store never decodes them.
//! - At most one explicit transaction is open per store; an open transaction
//!   is rolled back when the store is dropped.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::record::EditRecord;
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const STACK_TABLE: &str = "stack_entries";

/// Result type used by stack store operations.
pub type StackResult<T> = Result<T, StackStoreError>;

/// Errors from stack store operations.
#[derive(Debug)]
pub enum StackStoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Commit failed; the transaction was rolled back.
    TransactionFailure(DbError),
    /// `begin_transaction` called while a transaction is open.
    TransactionAlreadyActive,
    /// Commit or rollback requested without an open transaction.
    NoActiveTransaction,
    /// Stack name is blank after trim.
    InvalidStackName(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted row cannot be converted into the read model.
    InvalidData(String),
}

impl Display for StackStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TransactionFailure(err) => {
                write!(f, "stack store transaction failed and was rolled back: {err}")
            }
            Self::TransactionAlreadyActive => {
                write!(f, "stack store transaction is already active")
            }
            Self::NoActiveTransaction => write!(f, "no active stack store transaction"),
            Self::InvalidStackName(name) => write!(f, "invalid stack name: {name:?}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "stack store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "stack store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "stack store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid stack data: {message}"),
        }
    }
}

impl Error for StackStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) | Self::TransactionFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StackStoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StackStoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One of the two stacks kept per name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackRole {
    Undo,
    Redo,
}

impl StackRole {
    pub const ALL: [StackRole; 2] = [StackRole::Undo, StackRole::Redo];

    /// Persisted role tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "UndoStack",
            Self::Redo => "RedoStack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UndoStack" => Some(Self::Undo),
            "RedoStack" => Some(Self::Redo),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Undo => Self::Redo,
            Self::Redo => Self::Undo,
        }
    }
}

impl Display for StackRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository contract for named undo/redo stacks.
pub trait UndoStackRepository {
    /// Distinct names holding at least one record, sorted.
    fn stack_names(&self) -> StackResult<Vec<String>>;

    /// Full contents in push order, oldest first.
    fn stack_contents(&self, role: StackRole, name: &str) -> StackResult<Vec<EditRecord>>;

    fn stack_depth(&self, role: StackRole, name: &str) -> StackResult<usize>;

    fn push_record(&self, role: StackRole, name: &str, record: &EditRecord) -> StackResult<()>;

    /// Removes and returns the top record; `None` when the stack is empty.
    fn pop_stack(&self, role: StackRole, name: &str) -> StackResult<Option<EditRecord>>;

    /// Returns the top record without removing it.
    fn peek_stack(&self, role: StackRole, name: &str) -> StackResult<Option<EditRecord>>;

    fn clear_stack(&self, role: StackRole, name: &str) -> StackResult<()>;

    /// Clears both stacks of `name`; other names are untouched.
    fn clear_stacks_for_name(&self, name: &str) -> StackResult<()>;

    fn begin_transaction(&self) -> StackResult<()>;

    fn commit_transaction(&self) -> StackResult<()>;

    fn rollback_transaction(&self) -> StackResult<()>;

    fn in_transaction(&self) -> bool;

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    fn with_transaction<T, F>(&self, f: F) -> StackResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> StackResult<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction() {
                    warn!(
                        "event=stack_tx_rollback module=repo status=error error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

/// SQLite-backed stack store borrowing one connection.
pub struct SqliteUndoStackStore<'conn> {
    conn: &'conn Connection,
    in_transaction: Cell<bool>,
}

impl<'conn> SqliteUndoStackStore<'conn> {
    /// Creates a store bound to a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StackResult<Self> {
        ensure_stack_connection_ready(conn)?;
        Ok(Self {
            conn,
            in_transaction: Cell::new(false),
        })
    }
}

impl UndoStackRepository for SqliteUndoStackStore<'_> {
    fn stack_names(&self) -> StackResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT stack_name FROM stack_entries ORDER BY stack_name ASC;")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn stack_contents(&self, role: StackRole, name: &str) -> StackResult<Vec<EditRecord>> {
        validate_stack_name(name)?;
        let mut stmt = self.conn.prepare(
            "SELECT data
             FROM stack_entries
             WHERE stack_name = ?1 AND role = ?2
             ORDER BY entry_id ASC;",
        )?;
        let records = stmt
            .query_map(params![name, role.as_str()], |row| row.get::<_, String>(0))?
            .map(|data| data.map(EditRecord::from_raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn stack_depth(&self, role: StackRole, name: &str) -> StackResult<usize> {
        validate_stack_name(name)?;
        let depth: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM stack_entries WHERE stack_name = ?1 AND role = ?2;",
            params![name, role.as_str()],
            |row| row.get(0),
        )?;
        usize::try_from(depth)
            .map_err(|_| StackStoreError::InvalidData(format!("negative stack depth {depth}")))
    }

    fn push_record(&self, role: StackRole, name: &str, record: &EditRecord) -> StackResult<()> {
        validate_stack_name(name)?;
        self.conn.execute(
            "INSERT INTO stack_entries (stack_name, role, data) VALUES (?1, ?2, ?3);",
            params![name, role.as_str(), record.as_str()],
        )?;
        debug!(
            "event=stack_push module=repo status=ok stack={} role={} bytes={}",
            name,
            role,
            record.as_str().len()
        );
        Ok(())
    }

    fn pop_stack(&self, role: StackRole, name: &str) -> StackResult<Option<EditRecord>> {
        validate_stack_name(name)?;
        let data: Option<String> = self
            .conn
            .query_row(
                "DELETE FROM stack_entries
                 WHERE entry_id = (
                     SELECT MAX(entry_id)
                     FROM stack_entries
                     WHERE stack_name = ?1 AND role = ?2
                 )
                 RETURNING data;",
                params![name, role.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        debug!(
            "event=stack_pop module=repo status={} stack={} role={}",
            if data.is_some() { "ok" } else { "empty" },
            name,
            role
        );
        Ok(data.map(EditRecord::from_raw))
    }

    fn peek_stack(&self, role: StackRole, name: &str) -> StackResult<Option<EditRecord>> {
        validate_stack_name(name)?;
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data
                 FROM stack_entries
                 WHERE stack_name = ?1 AND role = ?2
                 ORDER BY entry_id DESC
                 LIMIT 1;",
                params![name, role.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(EditRecord::from_raw))
    }

    fn clear_stack(&self, role: StackRole, name: &str) -> StackResult<()> {
        validate_stack_name(name)?;
        let removed = self.conn.execute(
            "DELETE FROM stack_entries WHERE stack_name = ?1 AND role = ?2;",
            params![name, role.as_str()],
        )?;
        info!(
            "event=stack_clear module=repo status=ok stack={} role={} removed={}",
            name, role, removed
        );
        Ok(())
    }

    fn clear_stacks_for_name(&self, name: &str) -> StackResult<()> {
        validate_stack_name(name)?;
        let removed = self
            .conn
            .execute("DELETE FROM stack_entries WHERE stack_name = ?1;", [name])?;
        info!(
            "event=stack_clear module=repo status=ok stack={} role=all removed={}",
            name, removed
        );
        Ok(())
    }

    fn begin_transaction(&self) -> StackResult<()> {
        if self.in_transaction.get() {
            return Err(StackStoreError::TransactionAlreadyActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.in_transaction.set(true);
        debug!("event=stack_tx_begin module=repo status=ok");
        Ok(())
    }

    fn commit_transaction(&self) -> StackResult<()> {
        if !self.in_transaction.get() {
            return Err(StackStoreError::NoActiveTransaction);
        }
        let started_at = Instant::now();
        self.in_transaction.set(false);
        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            error!(
                "event=stack_tx_commit module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK;") {
                    error!(
                        "event=stack_tx_rollback module=repo status=error error={}",
                        rollback_err
                    );
                }
            }
            return Err(StackStoreError::TransactionFailure(DbError::Sqlite(err)));
        }
        debug!(
            "event=stack_tx_commit module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn rollback_transaction(&self) -> StackResult<()> {
        if !self.in_transaction.get() {
            return Err(StackStoreError::NoActiveTransaction);
        }
        self.in_transaction.set(false);
        self.conn.execute_batch("ROLLBACK;")?;
        info!("event=stack_tx_rollback module=repo status=ok");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }
}

impl Drop for SqliteUndoStackStore<'_> {
    fn drop(&mut self) {
        if !self.in_transaction.get() {
            return;
        }
        warn!("event=stack_tx_rollback module=repo status=start reason=dropped_open_transaction");
        if let Err(err) = self.rollback_transaction() {
            error!(
                "event=stack_tx_rollback module=repo status=error error={}",
                err
            );
        }
    }
}

pub(crate) fn validate_stack_name(name: &str) -> StackResult<()> {
    if name.trim().is_empty() {
        return Err(StackStoreError::InvalidStackName(name.to_string()));
    }
    Ok(())
}

fn ensure_stack_connection_ready(conn: &Connection) -> StackResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StackStoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, STACK_TABLE)? {
        return Err(StackStoreError::MissingRequiredTable(STACK_TABLE));
    }
    for column in ["entry_id", "stack_name", "role", "data"] {
        if !table_has_column(conn, STACK_TABLE, column)? {
            return Err(StackStoreError::MissingRequiredColumn {
                table: STACK_TABLE,
                column,
            });
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StackResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StackResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{StackRole, StackStoreError, SqliteUndoStackStore, UndoStackRepository};
    use crate::db::open_db_in_memory;
    use crate::model::record::EditRecord;
    use rusqlite::Connection;

    #[test]
    fn role_tags_round_trip() {
        for role in StackRole::ALL {
            assert_eq!(StackRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(StackRole::Undo.opposite(), StackRole::Redo);
        assert_eq!(StackRole::parse("Other"), None);
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteUndoStackStore::try_new(&conn);
        assert!(matches!(
            result,
            Err(StackStoreError::UninitializedConnection {
                actual_version: 0,
                ..
            })
        ));
    }

    #[test]
    fn blank_stack_name_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteUndoStackStore::try_new(&conn).unwrap();
        let err = store
            .push_record(StackRole::Undo, "  ", &EditRecord::from_raw("{}"))
            .unwrap_err();
        assert!(matches!(err, StackStoreError::InvalidStackName(_)));
    }

    #[test]
    fn nested_begin_and_stray_commit_fail() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteUndoStackStore::try_new(&conn).unwrap();
        assert!(matches!(
            store.commit_transaction(),
            Err(StackStoreError::NoActiveTransaction)
        ));
        store.begin_transaction().unwrap();
        assert!(matches!(
            store.begin_transaction(),
            Err(StackStoreError::TransactionAlreadyActive)
        ));
        store.rollback_transaction().unwrap();
        assert!(!store.in_transaction());
    }
}
