//! Object graph error taxonomy.

use crate::graph::loader::LoadError;
use crate::graph::object::ObjectState;
use crate::model::schema::SchemaError;
use crate::model::value::{ObjectHandle, ObjectId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type GraphResult<T> = Result<T, GraphError>;

/// Composite-tree invariant breaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// An object was placed into one of its own composite slots.
    SelfContainment { object: ObjectId },
    /// The insertion (or a traversal) would revisit `object`.
    Cycle { object: ObjectId },
    /// `object` is already strongly contained by another slot.
    AlreadyContained {
        object: ObjectId,
        owner: ObjectId,
        property: String,
    },
    /// A persistent object cannot be owned by a non-persistent parent.
    PersistentChildOfNewParent { parent: ObjectId, child: ObjectId },
}

impl Display for IntegrityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfContainment { object } => {
                write!(f, "object {object} cannot contain itself")
            }
            Self::Cycle { object } => write!(f, "composite cycle through object {object}"),
            Self::AlreadyContained {
                object,
                owner,
                property,
            } => write!(
                f,
                "object {object} is already contained by {owner} in `{property}`"
            ),
            Self::PersistentChildOfNewParent { parent, child } => write!(
                f,
                "persistent object {child} cannot be owned by non-persistent object {parent}"
            ),
        }
    }
}

/// Errors from editing-context operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Illegal argument, e.g. a foreign handle or an invalid persistence root.
    InvalidArgument(String),
    /// Handle does not name an object of this context.
    UnknownObject(ObjectHandle),
    UnknownEntity(String),
    UnknownProperty { entity: String, property: String },
    /// Value shape does not match the property schema.
    InvalidValue { property: String, message: String },
    /// Operation is not valid in the object's current state.
    InvalidState {
        id: ObjectId,
        state: ObjectState,
        operation: &'static str,
    },
    /// A will/did-change bracket is open on the object.
    MutationInProgress(ObjectId),
    /// Loading a fault failed; the object is still a fault.
    FaultResolution { id: ObjectId, source: LoadError },
    IntegrityViolation(IntegrityViolation),
    Schema(SchemaError),
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::UnknownObject(handle) => write!(f, "object not found: {handle}"),
            Self::UnknownEntity(name) => write!(f, "entity not registered: {name}"),
            Self::UnknownProperty { entity, property } => {
                write!(f, "entity `{entity}` has no property `{property}`")
            }
            Self::InvalidValue { property, message } => {
                write!(f, "invalid value for `{property}`: {message}")
            }
            Self::InvalidState {
                id,
                state,
                operation,
            } => write!(f, "cannot {operation} object {id} in state {state}"),
            Self::MutationInProgress(id) => {
                write!(f, "object {id} has a mutation in progress")
            }
            Self::FaultResolution { id, source } => {
                write!(f, "failed to resolve fault {id}: {source}")
            }
            Self::IntegrityViolation(violation) => write!(f, "integrity violation: {violation}"),
            Self::Schema(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GraphError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::FaultResolution { source, .. } => Some(source),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for GraphError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<IntegrityViolation> for GraphError {
    fn from(value: IntegrityViolation) -> Self {
        Self::IntegrityViolation(value)
    }
}
