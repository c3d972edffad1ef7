//! Repository layer over SQLite.
//!
//! # Responsibility
//! - Define storage contracts consumed by services.
//! - Keep SQL details inside the repository boundary.
//!
//! # Invariants
//! - Repositories only accept connections whose schema matches
//!   `db::migrations::latest_version()`.

pub mod stack_repo;
