//! Object graph vocabulary shared by the fault engine and the stack store.
//!
//! # Responsibility
//! - Define identities, context-scoped handles and property values.
//! - Describe entity schemas consumed by schema-driven property access.
//! - Define the opaque edit record persisted by the undo/redo stack store.
//!
//! # Invariants
//! - Every persistent object is identified by a stable `ObjectId`.
//! - Handles compare equal only when identity and context both match.

pub mod record;
pub mod schema;
pub mod value;
