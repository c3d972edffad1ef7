//! Backing-store seam used to resolve faults.
//!
//! # Responsibility
//! - Define the serialized object shape exchanged with the backing store.
//! - Provide an in-memory store for tests and short-lived sessions.
//!
//! # Invariants
//! - Property lists hold persistent properties only.
//! - References inside property lists use the `$ref`/`$entity` marker.

use crate::model::value::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Serialized property values keyed by property name.
pub type PropertyList = BTreeMap<String, JsonValue>;

/// Serialized state of one persistent object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: ObjectId,
    pub entity: String,
    /// `None` for detached objects.
    pub root: Option<ObjectId>,
    /// Composite slot holding the object when it was stored; `None` for roots
    /// and detached objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<StoredOwner>,
    pub properties: PropertyList,
}

/// Owning `(parent, property)` slot recorded with a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOwner {
    pub parent: ObjectId,
    pub property: String,
}

/// Fault loading errors reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    NotFound(ObjectId),
    /// Transport or I/O failure; retrying may succeed.
    Backend(String),
    /// Stored data cannot be decoded against the registered schema.
    Malformed(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "stored object not found: {id}"),
            Self::Backend(message) => write!(f, "backing store failure: {message}"),
            Self::Malformed(message) => write!(f, "malformed stored object: {message}"),
        }
    }
}

impl Error for LoadError {}

/// Supplies serialized property data for fault resolution.
pub trait ObjectLoader {
    fn load_object(&self, id: ObjectId) -> Result<StoredObject, LoadError>;
}

/// In-memory object store.
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RefCell<HashMap<ObjectId, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one stored object.
    pub fn save(&self, object: StoredObject) {
        self.objects.borrow_mut().insert(object.id, object);
    }

    pub fn remove(&self, id: ObjectId) -> Option<StoredObject> {
        self.objects.borrow_mut().remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<StoredObject> {
        self.objects.borrow().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }
}

impl ObjectLoader for MemoryObjectStore {
    fn load_object(&self, id: ObjectId) -> Result<StoredObject, LoadError> {
        self.get(id).ok_or(LoadError::NotFound(id))
    }
}
