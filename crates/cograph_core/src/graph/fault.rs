//! Fault engine: persistence activation, fault resolution and keyed access.
//!
//! # Invariants
//! - Fault resolution decodes the whole stored payload before touching the
//!   object; a failed load leaves the object a fault with empty storage.
//! - `unfault_if_needed` on a resident object fires no hooks.
//! - Generic writes validate the value shape against the property schema
//!   before the will-change hook fires.

use crate::graph::context::EditingContext;
use crate::graph::error::{GraphError, GraphResult, IntegrityViolation};
use crate::graph::lifecycle::LifecycleEvent;
use crate::graph::loader::LoadError;
use crate::graph::object::{ObjectState, Owner};
use crate::graph::plist::DecodedObject;
use crate::model::schema::{Cardinality, PropertyDescriptor, PropertyKind};
use crate::model::value::{ObjectHandle, ObjectId, Value};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Instant;

impl EditingContext {
    /// Binds a new object (and its attached composite subgraph) to this context.
    ///
    /// `root` is either `object` itself, making it a root, or an
    /// already-persistent object of this context.
    ///
    /// # Errors
    /// - `InvalidArgument` when `object` is not new, is owned by a
    ///   non-persistent parent, or `root` is foreign, unknown or not persistent.
    pub fn become_persistent(&mut self, object: ObjectHandle, root: ObjectHandle) -> GraphResult<()> {
        self.ensure_local(object)?;
        let record = self
            .objects
            .get(&object.id())
            .ok_or_else(|| GraphError::InvalidArgument(format!("object {object} is not registered")))?;
        if record.state != ObjectState::New {
            return Err(GraphError::InvalidArgument(format!(
                "object {} is already {}",
                object.id(),
                record.state
            )));
        }
        if let Some(owner) = &record.owner {
            return Err(GraphError::InvalidArgument(format!(
                "object {} is contained by non-persistent object {}",
                object.id(),
                owner.parent
            )));
        }

        if root != object {
            self.ensure_local(root)?;
            let root_record = self.objects.get(&root.id()).ok_or_else(|| {
                GraphError::InvalidArgument(format!("root {root} is not registered"))
            })?;
            if !root_record.state.is_persistent() {
                return Err(GraphError::InvalidArgument(format!(
                    "root {} must be persistent, found {}",
                    root.id(),
                    root_record.state
                )));
            }
        }

        let inserted = self.persist_subtree(object, Some(root.id()));
        if root != object {
            self.record_mut(object)?.awaiting_attach = true;
        }
        info!(
            "event=become_persistent module=graph status=ok object={} root={} inserted={}",
            object.id(),
            root.id(),
            inserted
        );
        Ok(())
    }

    /// Loads the object from the backing store when it is a fault.
    ///
    /// # Errors
    /// - `FaultResolution` when the loader fails or returns undecodable data;
    ///   the object stays a fault and the call may be retried.
    /// - `InvalidState` for destroyed objects.
    pub fn unfault_if_needed(&mut self, object: ObjectHandle) -> GraphResult<()> {
        let record = self.record(object)?;
        match record.state {
            ObjectState::New | ObjectState::Resident => Ok(()),
            ObjectState::Destroyed => Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "unfault",
            }),
            ObjectState::Fault => self.resolve_fault(object),
        }
    }

    /// Discards property storage and turns a resident object into a fault.
    ///
    /// # Errors
    /// - `InvalidState` unless the object is resident and undamaged.
    /// - `MutationInProgress` while a will/did-change bracket is open.
    pub fn turn_into_fault(&mut self, object: ObjectHandle) -> GraphResult<()> {
        let record = self.record(object)?;
        if record.state != ObjectState::Resident {
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "turn into fault",
            });
        }
        if record.mutations_in_progress > 0 {
            return Err(GraphError::MutationInProgress(object.id()));
        }
        if self.damaged.contains(&object.id()) {
            warn!(
                "event=turn_into_fault module=graph status=rejected object={} reason=damaged",
                object.id()
            );
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "turn damaged object into fault",
            });
        }

        self.dispatch(object, LifecycleEvent::WillTurnIntoFault);
        let record = self.record_mut(object)?;
        record.storage.clear();
        record.state = ObjectState::Fault;
        self.dispatch(object, LifecycleEvent::DidTurnIntoFault);
        debug!(
            "event=turn_into_fault module=graph status=ok object={}",
            object.id()
        );
        Ok(())
    }

    /// Reads one declared property, resolving the fault first.
    pub fn value_for_property(&mut self, object: ObjectHandle, property: &str) -> GraphResult<Value> {
        self.unfault_if_needed(object)?;
        let descriptor = self.descriptor(object, property)?;
        Ok(self.record(object)?.value_or_empty(&descriptor))
    }

    /// Writes one declared property through the notification pipeline.
    ///
    /// Composite properties run the relationship consistency checks first;
    /// a rejected write fires no hooks.
    pub fn set_value(&mut self, object: ObjectHandle, property: &str, value: Value) -> GraphResult<()> {
        self.unfault_if_needed(object)?;
        self.ensure_usable(object, "set value on")?;
        let descriptor = self.descriptor(object, property)?;
        let value = normalize_value(&descriptor, value)?;
        self.ensure_known_refs(&value)?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        if descriptor.is_composite() {
            let old_children = self.record(object)?.composite_children(property);
            let new_children: Vec<ObjectId> =
                value.object_refs().iter().map(ObjectHandle::id).collect();
            let mut seen = HashSet::new();
            for child in &new_children {
                if !seen.insert(*child) {
                    return Err(self.reject(IntegrityViolation::AlreadyContained {
                        object: *child,
                        owner: object.id(),
                        property: property.to_string(),
                    }));
                }
            }
            added = new_children
                .iter()
                .filter(|id| !old_children.contains(id))
                .map(|id| self.handle(*id))
                .collect();
            removed = old_children
                .iter()
                .filter(|id| !new_children.contains(id))
                .map(|id| self.handle(*id))
                .collect();
            self.check_composite_insert(object, property, &added)?;
        }

        self.will_change_value(object, property)?;
        self.store_value(object, property, value)?;
        for child in removed {
            self.detach_child(object, child);
        }
        for child in added {
            self.attach_child(object, property, child);
        }
        self.did_change_value(object, property)
    }

    /// Reads storage directly: no fault resolution, no notifications.
    ///
    /// Reserved for serialization code; faults report `None` for every key.
    pub fn primitive_value(&self, object: ObjectHandle, key: &str) -> GraphResult<Option<&Value>> {
        Ok(self.record(object)?.storage.get(key))
    }

    /// Writes storage directly: no validation, consistency update or hooks.
    pub fn set_primitive_value(&mut self, object: ObjectHandle, key: &str, value: Value) -> GraphResult<()> {
        let record = self.record_mut(object)?;
        if value.is_null() {
            record.storage.remove(key);
        } else {
            record.storage.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Deep-copies the composite subtree into new objects with fresh identities.
    ///
    /// Non-composite references are shared with the source.
    pub fn copy_object(&mut self, object: ObjectHandle) -> GraphResult<ObjectHandle> {
        let mut visited = HashSet::new();
        self.copy_recursive(object, &mut visited)
    }

    fn copy_recursive(
        &mut self,
        source: ObjectHandle,
        visited: &mut HashSet<ObjectId>,
    ) -> GraphResult<ObjectHandle> {
        if !visited.insert(source.id()) {
            return Err(self.reject(IntegrityViolation::Cycle {
                object: source.id(),
            }));
        }
        self.unfault_if_needed(source)?;
        self.ensure_usable(source, "copy")?;
        let entity = self.entity(source)?;
        let storage = self.record(source)?.storage.clone();
        let copy = self.create_object(&entity)?;

        for (key, value) in storage {
            let composite = entity
                .property(key.as_str())
                .is_some_and(PropertyDescriptor::is_composite);
            let copied = if composite {
                self.copy_composite_value(copy, key.as_str(), value, visited)?
            } else {
                value
            };
            self.record_mut(copy)?.storage.insert(key, copied);
        }
        Ok(copy)
    }

    fn copy_composite_value(
        &mut self,
        parent: ObjectHandle,
        property: &str,
        value: Value,
        visited: &mut HashSet<ObjectId>,
    ) -> GraphResult<Value> {
        match value {
            Value::Object(child) => {
                let copied = self.copy_recursive(child, visited)?;
                self.own(parent, property, copied)?;
                Ok(Value::Object(copied))
            }
            Value::List(items) => {
                let mut copied_items = Vec::with_capacity(items.len());
                for item in items {
                    copied_items.push(self.copy_composite_value(parent, property, item, visited)?);
                }
                Ok(Value::List(copied_items))
            }
            other => Ok(other),
        }
    }

    fn own(&mut self, parent: ObjectHandle, property: &str, child: ObjectHandle) -> GraphResult<()> {
        self.record_mut(child)?.owner = Some(Owner {
            parent: parent.id(),
            property: property.to_string(),
        });
        Ok(())
    }

    fn resolve_fault(&mut self, object: ObjectHandle) -> GraphResult<()> {
        let id = object.id();
        let started_at = Instant::now();
        let stored = match self.loader.load_object(id) {
            Ok(stored) => stored,
            Err(source) => {
                warn!(
                    "event=unfault module=graph status=error object={} duration_ms={} error={}",
                    id,
                    started_at.elapsed().as_millis(),
                    source
                );
                return Err(GraphError::FaultResolution { id, source });
            }
        };

        let decoded = self.decode_stored(object, &stored).map_err(|message| {
            warn!(
                "event=unfault module=graph status=error object={} error_code=malformed error={}",
                id, message
            );
            GraphError::FaultResolution {
                id,
                source: LoadError::Malformed(message),
            }
        })?;

        if let Err(err) = self.install_loaded(object, stored.root, decoded) {
            warn!(
                "event=unfault module=graph status=error object={} error_code=owner_conflict error={}",
                id, err
            );
            return Err(err);
        }
        self.dispatch(object, LifecycleEvent::AwakeFromFetch);
        debug!(
            "event=unfault module=graph status=ok object={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Applies a decoded payload. Consistency checks are skipped: stored data
    /// is trusted, only owner and root back-references are recorded.
    ///
    /// A child already owned by another slot in this context is an
    /// `AlreadyContained` violation; nothing is applied and the object stays
    /// a fault.
    fn install_loaded(
        &mut self,
        object: ObjectHandle,
        stored_root: Option<ObjectId>,
        decoded: DecodedObject,
    ) -> GraphResult<()> {
        let record = self.record(object)?;
        let children: Vec<(String, ObjectId)> = record
            .entity
            .composite_properties()
            .flat_map(|property| {
                decoded
                    .storage
                    .get(property.name.as_str())
                    .map(Value::object_refs)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| (property.name.clone(), child.id()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (property, child) in &children {
            let conflict = self
                .objects
                .get(child)
                .and_then(|record| record.owner.as_ref())
                .filter(|owner| owner.parent != object.id() || owner.property != *property);
            if let Some(owner) = conflict {
                return Err(self.reject(IntegrityViolation::AlreadyContained {
                    object: *child,
                    owner: owner.parent,
                    property: owner.property.clone(),
                }));
            }
        }

        self.register_pending(decoded.pending_faults);
        let record = self.record_mut(object)?;
        record.storage = decoded.storage;
        record.state = ObjectState::Resident;
        if record.root.is_none() {
            record.root = stored_root;
        }
        let root = record.root;

        for (property, child) in children {
            if let Some(child_record) = self.objects.get_mut(&child) {
                child_record.owner = Some(Owner {
                    parent: object.id(),
                    property,
                });
                child_record.root = root;
            }
        }
        Ok(())
    }

    /// Marks every new object of the composite subgraph resident under `root`.
    ///
    /// Returns the number of objects inserted.
    pub(super) fn persist_subtree(&mut self, object: ObjectHandle, root: Option<ObjectId>) -> usize {
        let mut members = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![object.id()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(record) = self.objects.get(&id) else {
                continue;
            };
            if record.state != ObjectState::New {
                continue;
            }
            members.push(id);
            for property in record.entity.composite_properties() {
                stack.extend(record.composite_children(property.name.as_str()));
            }
        }

        for id in &members {
            if let Some(record) = self.objects.get_mut(id) {
                record.state = ObjectState::Resident;
                record.root = root;
            }
            self.damaged.insert(*id);
        }
        let inserted = members.len();
        for id in members {
            let handle = self.handle(id);
            self.dispatch(handle, LifecycleEvent::AwakeFromInsert);
        }
        inserted
    }

    pub(super) fn descriptor(&self, object: ObjectHandle, property: &str) -> GraphResult<PropertyDescriptor> {
        let record = self.record(object)?;
        record
            .entity
            .property(property)
            .cloned()
            .ok_or_else(|| GraphError::UnknownProperty {
                entity: record.entity.name().to_string(),
                property: property.to_string(),
            })
    }

    pub(super) fn store_value(&mut self, object: ObjectHandle, property: &str, value: Value) -> GraphResult<()> {
        let record = self.record_mut(object)?;
        if value.is_null() {
            record.storage.remove(property);
        } else {
            record.storage.insert(property.to_string(), value);
        }
        Ok(())
    }

    /// Referenced objects must be live members of this context.
    pub(super) fn ensure_known_refs(&self, value: &Value) -> GraphResult<()> {
        for handle in value.object_refs() {
            let record = self.record(handle).map_err(|err| match err {
                GraphError::UnknownObject(handle) => {
                    GraphError::InvalidArgument(format!("referenced object {handle} is not registered"))
                }
                other => other,
            })?;
            if record.state == ObjectState::Destroyed {
                return Err(GraphError::InvalidState {
                    id: handle.id(),
                    state: record.state,
                    operation: "reference",
                });
            }
        }
        Ok(())
    }
}

/// Validates a whole-property value against its schema.
///
/// `Null` clears single-valued properties and empties collections.
/// Unordered collections drop duplicate members.
pub(super) fn normalize_value(descriptor: &PropertyDescriptor, value: Value) -> GraphResult<Value> {
    match descriptor.cardinality {
        Cardinality::One => match value {
            Value::Null => Ok(Value::Null),
            Value::List(_) => Err(invalid_value(
                descriptor,
                "single-valued property cannot hold a list",
            )),
            element => {
                check_element(descriptor, &element)?;
                Ok(element)
            }
        },
        Cardinality::Ordered | Cardinality::Unordered => match value {
            Value::Null => Ok(Value::List(Vec::new())),
            Value::List(items) => {
                let mut normalized: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    check_element(descriptor, &item)?;
                    if descriptor.cardinality == Cardinality::Unordered && normalized.contains(&item) {
                        continue;
                    }
                    normalized.push(item);
                }
                Ok(Value::List(normalized))
            }
            other => Err(invalid_value(
                descriptor,
                &format!("multivalued property requires a list, got {}", other.kind_name()),
            )),
        },
    }
}

/// Validates one member of a property value.
pub(super) fn check_element(descriptor: &PropertyDescriptor, element: &Value) -> GraphResult<()> {
    match (descriptor.kind, element) {
        (_, Value::Null) => Err(invalid_value(descriptor, "null is not a collection member")),
        (_, Value::List(_)) => Err(invalid_value(descriptor, "nested lists are not supported")),
        (PropertyKind::Attribute, Value::Object(_)) => Err(invalid_value(
            descriptor,
            "attribute cannot hold an object reference",
        )),
        (PropertyKind::Attribute, _) => Ok(()),
        (PropertyKind::Reference { .. }, Value::Object(_)) => Ok(()),
        (PropertyKind::Reference { .. }, other) => Err(invalid_value(
            descriptor,
            &format!("expected object reference, got {}", other.kind_name()),
        )),
    }
}

fn invalid_value(descriptor: &PropertyDescriptor, message: &str) -> GraphError {
    GraphError::InvalidValue {
        property: descriptor.name.clone(),
        message: message.to_string(),
    }
}
