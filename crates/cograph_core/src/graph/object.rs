//! Per-object record held in the context table.

use crate::model::schema::{EntityDescriptor, PropertyDescriptor};
use crate::model::value::{ObjectId, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Fault lifecycle state.
///
/// `New -> Resident <-> Fault -> Destroyed`; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Created, not yet bound to persistence.
    New,
    /// Persistent and fully loaded.
    Resident,
    /// Persistent placeholder holding identity and schema only.
    Fault,
    /// Contents discarded, no further use.
    Destroyed,
}

impl ObjectState {
    pub fn is_persistent(self) -> bool {
        matches!(self, Self::Resident | Self::Fault)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Resident => "resident",
            Self::Fault => "fault",
            Self::Destroyed => "destroyed",
        }
    }
}

impl Display for ObjectState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite slot currently holding an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Owner {
    pub(crate) parent: ObjectId,
    pub(crate) property: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectRecord {
    pub(crate) entity: Arc<EntityDescriptor>,
    pub(crate) state: ObjectState,
    pub(crate) root: Option<ObjectId>,
    pub(crate) owner: Option<Owner>,
    /// Persistent under a foreign root but not yet inserted into its tree.
    pub(crate) awaiting_attach: bool,
    pub(crate) storage: BTreeMap<String, Value>,
    pub(crate) ignoring_damage_notifications: bool,
    pub(crate) ignoring_relationship_consistency: bool,
    pub(crate) mutations_in_progress: u32,
}

impl ObjectRecord {
    pub(crate) fn new(entity: Arc<EntityDescriptor>, state: ObjectState) -> Self {
        Self {
            entity,
            state,
            root: None,
            owner: None,
            awaiting_attach: false,
            storage: BTreeMap::new(),
            ignoring_damage_notifications: false,
            ignoring_relationship_consistency: false,
            mutations_in_progress: 0,
        }
    }

    /// Stored value, or the empty value for the property's cardinality.
    pub(crate) fn value_or_empty(&self, property: &PropertyDescriptor) -> Value {
        match self.storage.get(property.name.as_str()) {
            Some(value) => value.clone(),
            None => empty_value(property),
        }
    }

    /// Identities held by one composite property, in storage order.
    pub(crate) fn composite_children(&self, property: &str) -> Vec<ObjectId> {
        self.storage
            .get(property)
            .map(|value| {
                value
                    .object_refs()
                    .into_iter()
                    .map(|handle| handle.id())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub(crate) fn empty_value(property: &PropertyDescriptor) -> Value {
    if property.is_multivalued() {
        Value::List(Vec::new())
    } else {
        Value::Null
    }
}
