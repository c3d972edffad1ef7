//! Named undo/redo stack handle.
//!
//! # Responsibility
//! - Bind a stack name to a repository and expose per-role operations.
//! - Move records between the undo and redo stacks atomically.
//!
//! # Invariants
//! - A handle's name is validated once, at creation.
//! - `transfer` either moves exactly one record or changes nothing.

use crate::model::record::EditRecord;
use crate::repo::stack_repo::{validate_stack_name, StackResult, StackRole, UndoStackRepository};
use log::info;

/// Returns the handle for the stacks stored under `name`.
///
/// Nothing is written until the first push; an unknown name is simply empty.
pub fn stack_for_name<'repo, R: UndoStackRepository>(
    repo: &'repo R,
    name: &str,
) -> StackResult<UndoStack<'repo, R>> {
    validate_stack_name(name)?;
    Ok(UndoStack {
        repo,
        name: name.to_string(),
    })
}

/// Undo and redo stacks sharing one name.
pub struct UndoStack<'repo, R: UndoStackRepository> {
    repo: &'repo R,
    name: String,
}

impl<R: UndoStackRepository> UndoStack<'_, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, role: StackRole, record: &EditRecord) -> StackResult<()> {
        self.repo.push_record(role, &self.name, record)
    }

    pub fn pop(&self, role: StackRole) -> StackResult<Option<EditRecord>> {
        self.repo.pop_stack(role, &self.name)
    }

    pub fn peek(&self, role: StackRole) -> StackResult<Option<EditRecord>> {
        self.repo.peek_stack(role, &self.name)
    }

    /// Records oldest first.
    pub fn contents(&self, role: StackRole) -> StackResult<Vec<EditRecord>> {
        self.repo.stack_contents(role, &self.name)
    }

    pub fn depth(&self, role: StackRole) -> StackResult<usize> {
        self.repo.stack_depth(role, &self.name)
    }

    pub fn clear(&self, role: StackRole) -> StackResult<()> {
        self.repo.clear_stack(role, &self.name)
    }

    pub fn clear_all(&self) -> StackResult<()> {
        self.repo.clear_stacks_for_name(&self.name)
    }

    /// Pops the top of `from` and pushes it onto the opposite stack.
    ///
    /// Runs in its own transaction unless the caller already opened one.
    /// Returns the moved record, or `None` when `from` was empty.
    pub fn transfer(&self, from: StackRole) -> StackResult<Option<EditRecord>> {
        let moved = if self.repo.in_transaction() {
            self.transfer_inline(from)?
        } else {
            self.repo.with_transaction(|_| self.transfer_inline(from))?
        };
        if moved.is_some() {
            info!(
                "event=stack_transfer module=service status=ok stack={} from={} to={}",
                self.name,
                from,
                from.opposite()
            );
        }
        Ok(moved)
    }

    fn transfer_inline(&self, from: StackRole) -> StackResult<Option<EditRecord>> {
        let Some(record) = self.pop(from)? else {
            return Ok(None);
        };
        self.push(from.opposite(), &record)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::stack_for_name;
    use crate::db::open_db_in_memory;
    use crate::model::record::EditRecord;
    use crate::repo::stack_repo::{SqliteUndoStackStore, StackRole, StackStoreError};

    #[test]
    fn transfer_moves_top_record_to_redo() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteUndoStackStore::try_new(&conn).unwrap();
        let stack = stack_for_name(&store, "doc1").unwrap();
        stack
            .push(StackRole::Undo, &EditRecord::from_raw(r#"{"type":"a"}"#))
            .unwrap();
        stack
            .push(StackRole::Undo, &EditRecord::from_raw(r#"{"type":"b"}"#))
            .unwrap();

        let moved = stack.transfer(StackRole::Undo).unwrap().unwrap();

        assert_eq!(moved.as_str(), r#"{"type":"b"}"#);
        assert_eq!(stack.depth(StackRole::Undo).unwrap(), 1);
        assert_eq!(stack.peek(StackRole::Redo).unwrap(), Some(moved));
    }

    #[test]
    fn transfer_from_empty_stack_is_noop() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteUndoStackStore::try_new(&conn).unwrap();
        let stack = stack_for_name(&store, "doc1").unwrap();

        assert_eq!(stack.transfer(StackRole::Redo).unwrap(), None);
        assert!(stack.contents(StackRole::Undo).unwrap().is_empty());
    }

    #[test]
    fn blank_name_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteUndoStackStore::try_new(&conn).unwrap();
        assert!(matches!(
            stack_for_name(&store, ""),
            Err(StackStoreError::InvalidStackName(_))
        ));
    }
}
