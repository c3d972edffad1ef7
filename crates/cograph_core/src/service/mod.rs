//! Use-case services on top of repositories.

pub mod undo_stack;
