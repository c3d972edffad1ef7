//! Identities, handles and property values.
//!
//! # Responsibility
//! - Provide the stable identity type shared by objects and stored records.
//! - Provide context-scoped handles used as non-owning object references.
//! - Define the value shape held in object property storage.
//!
//! # Invariants
//! - `ObjectId` is assigned once at construction and never reused.
//! - `ContextId` values are unique within one process.
//! - `Value::Object` always carries the handle of the context that owns the
//!   referenced object.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Stable identifier for every persistent object.
pub type ObjectId = Uuid;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one editing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Non-owning reference to one object, resolved through its context table.
///
/// Two handles are equal iff they name the same identity in the same
/// context. Non-persistent objects also get a fresh identity at creation,
/// so handle equality doubles as reference identity for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    context: ContextId,
    id: ObjectId,
}

impl ObjectHandle {
    pub(crate) fn new(context: ContextId, id: ObjectId) -> Self {
        Self { context, id }
    }

    /// Stable identity of the referenced object.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Context that owns the referenced object.
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.context)
    }
}

/// Property value held in object storage.
///
/// Multivalued properties always hold `Value::List`, for unordered
/// properties the list order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(ObjectHandle),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Object handles referenced directly by this value (one level deep).
    pub fn object_refs(&self) -> Vec<ObjectHandle> {
        match self {
            Self::Object(handle) => vec![*handle],
            Self::List(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        }
    }

    /// Short shape name used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Object(_) => "object",
            Self::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<ObjectHandle> for Value {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<ObjectHandle>> for Value {
    fn from(value: Vec<ObjectHandle>) -> Self {
        Self::List(value.into_iter().map(Value::Object).collect())
    }
}
