//! Lazily-loaded persistent object graph.
//!
//! # Responsibility
//! - Own the identity table of one editing context and its fault lifecycle.
//! - Keep composite ownership trees structurally valid under mutation.
//! - Bracket every mutation with lifecycle hooks and damage bookkeeping.
//!
//! # Invariants
//! - Objects are addressed through `ObjectHandle`; back-references (root,
//!   owner) are identities resolved through the context table.
//! - The composite subgraph is a forest: acyclic, single owner per object.
//! - Validation happens before the will-change hook; a rejected mutation
//!   fires no hooks and leaves storage untouched.

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod object;
pub mod query;

mod collection;
mod consistency;
mod fault;
mod notify;
mod plist;
mod traversal;
