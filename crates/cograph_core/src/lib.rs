//! Core of the cograph object-graph persistence layer.
//!
//! Two independent parts live here: the lazily-loaded, integrity-checked
//! object graph (`graph`, `model`) and the durable undo/redo stack store
//! (`db`, `repo`, `service`).

pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use graph::context::EditingContext;
pub use graph::error::{GraphError, GraphResult, IntegrityViolation};
pub use graph::lifecycle::{LifecycleEvent, LifecycleHook};
pub use graph::loader::{
    LoadError, MemoryObjectStore, ObjectLoader, PropertyList, StoredObject,
    StoredOwner,
};
pub use graph::object::ObjectState;
pub use graph::query::ObjectQuery;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::EditRecord;
pub use model::schema::{
    Cardinality, EntityBuilder, EntityDescriptor, PropertyDescriptor, PropertyKind,
    SchemaError, SchemaRegistry,
};
pub use model::value::{ContextId, ObjectHandle, ObjectId, Value};
pub use repo::stack_repo::{
    SqliteUndoStackStore, StackResult, StackRole, StackStoreError, UndoStackRepository,
};
pub use service::undo_stack::{stack_for_name, UndoStack};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
