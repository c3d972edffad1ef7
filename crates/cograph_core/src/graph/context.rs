//! Editing context: identity table, schema registry, hooks and damage set.
//!
//! # Responsibility
//! - Own every object record of one graph and resolve handles to records.
//! - Keep the per-entity lifecycle hook table and dispatch events.
//! - Track damage (pending-commit) membership for persistent objects.
//!
//! # Invariants
//! - One record per identity; resolving a fault reuses that record.
//! - Handles from another context are rejected, never resolved.
//! - Damage is context state; objects never cache it.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::lifecycle::{LifecycleEvent, LifecycleHook};
use crate::graph::loader::ObjectLoader;
use crate::graph::object::{ObjectRecord, ObjectState};
use crate::model::schema::{EntityDescriptor, SchemaRegistry, NAME_PROPERTY};
use crate::model::value::{ContextId, ObjectHandle, ObjectId, Value};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Owner of one object graph.
pub struct EditingContext {
    pub(super) id: ContextId,
    pub(super) objects: HashMap<ObjectId, ObjectRecord>,
    pub(super) damaged: BTreeSet<ObjectId>,
    pub(super) schema: SchemaRegistry,
    pub(super) hooks: HashMap<String, Vec<Rc<dyn LifecycleHook>>>,
    pub(super) loader: Rc<dyn ObjectLoader>,
}

impl EditingContext {
    /// Creates an empty context resolving faults through `loader`.
    pub fn new(loader: Rc<dyn ObjectLoader>) -> Self {
        let id = ContextId::next();
        debug!("event=context_open module=graph status=ok context={id}");
        Self {
            id,
            objects: HashMap::new(),
            damaged: BTreeSet::new(),
            schema: SchemaRegistry::new(),
            hooks: HashMap::new(),
            loader,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Number of records (any state) in the identity table.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn register_entity(&mut self, entity: Arc<EntityDescriptor>) -> GraphResult<()> {
        self.schema.register(entity)?;
        Ok(())
    }

    pub fn entity_named(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.schema.get(name)
    }

    /// Appends one hook to the table entry of `entity_name`.
    pub fn register_hook(&mut self, entity_name: impl Into<String>, hook: Rc<dyn LifecycleHook>) {
        self.hooks.entry(entity_name.into()).or_default().push(hook);
    }

    /// Creates a non-persistent object with a fresh identity.
    ///
    /// Registers `entity` when unknown and fires `DidCreate`.
    pub fn create_object(&mut self, entity: &Arc<EntityDescriptor>) -> GraphResult<ObjectHandle> {
        self.schema.register(Arc::clone(entity))?;
        let id = Uuid::new_v4();
        self.objects
            .insert(id, ObjectRecord::new(Arc::clone(entity), ObjectState::New));
        let handle = self.handle(id);
        self.dispatch(handle, LifecycleEvent::DidCreate);
        Ok(handle)
    }

    /// Creates an object and makes it persistent in one step.
    ///
    /// `root = None` makes the new object a root.
    pub fn insert_object(
        &mut self,
        entity: &Arc<EntityDescriptor>,
        root: Option<ObjectHandle>,
    ) -> GraphResult<ObjectHandle> {
        let object = self.create_object(entity)?;
        self.become_persistent(object, root.unwrap_or(object))?;
        Ok(object)
    }

    /// Returns the live object for `id`, registering a fault when unknown.
    pub fn fault_for_id(&mut self, id: ObjectId, entity_name: &str) -> GraphResult<ObjectHandle> {
        let entity = self
            .schema
            .get(entity_name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownEntity(entity_name.to_string()))?;

        if let Some(record) = self.objects.get(&id) {
            if record.entity.name() != entity_name {
                return Err(GraphError::InvalidArgument(format!(
                    "object {id} is registered as `{}`, not `{entity_name}`",
                    record.entity.name()
                )));
            }
            return Ok(self.handle(id));
        }

        self.objects
            .insert(id, ObjectRecord::new(entity, ObjectState::Fault));
        Ok(self.handle(id))
    }

    /// Resolves an identity to a live handle without loading anything.
    pub fn object_with_id(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.objects.get(&id).map(|_| self.handle(id))
    }

    pub fn state(&self, object: ObjectHandle) -> GraphResult<ObjectState> {
        Ok(self.record(object)?.state)
    }

    pub fn entity(&self, object: ObjectHandle) -> GraphResult<Arc<EntityDescriptor>> {
        Ok(Arc::clone(&self.record(object)?.entity))
    }

    pub fn is_fault(&self, object: ObjectHandle) -> GraphResult<bool> {
        Ok(self.state(object)? == ObjectState::Fault)
    }

    pub fn is_persistent(&self, object: ObjectHandle) -> GraphResult<bool> {
        Ok(self.state(object)?.is_persistent())
    }

    /// Whether the object is persistent and its own root.
    pub fn is_root(&self, object: ObjectHandle) -> GraphResult<bool> {
        let record = self.record(object)?;
        Ok(record.state.is_persistent() && record.root == Some(object.id()))
    }

    /// Root enclosing the object; `None` when not persistent or detached.
    ///
    /// An object made persistent under another root reports `None` until it
    /// is inserted into a composite slot of that tree.
    pub fn root_object(&self, object: ObjectHandle) -> GraphResult<Option<ObjectHandle>> {
        let record = self.record(object)?;
        if !record.state.is_persistent() || record.awaiting_attach {
            return Ok(None);
        }
        Ok(record.root.map(|root| self.handle(root)))
    }

    /// Composite slot `(parent, property)` that currently owns the object.
    pub fn owner_of(&self, object: ObjectHandle) -> GraphResult<Option<(ObjectHandle, String)>> {
        Ok(self
            .record(object)?
            .owner
            .as_ref()
            .map(|owner| (self.handle(owner.parent), owner.property.clone())))
    }

    pub fn is_damaged(&self, object: ObjectHandle) -> bool {
        object.context() == self.id && self.damaged.contains(&object.id())
    }

    /// Damaged objects in identity order.
    pub fn damaged_objects(&self) -> Vec<ObjectHandle> {
        self.damaged.iter().map(|id| self.handle(*id)).collect()
    }

    pub fn mark_undamaged(&mut self, object: ObjectHandle) {
        if object.context() == self.id {
            self.damaged.remove(&object.id());
        }
    }

    /// Forgets all damage, e.g. after the commit collaborator persisted it.
    pub fn clear_damage(&mut self) {
        self.damaged.clear();
    }

    pub fn set_ignoring_damage_notifications(
        &mut self,
        object: ObjectHandle,
        ignore: bool,
    ) -> GraphResult<()> {
        self.record_mut(object)?.ignoring_damage_notifications = ignore;
        Ok(())
    }

    pub fn is_ignoring_damage_notifications(&self, object: ObjectHandle) -> GraphResult<bool> {
        Ok(self.record(object)?.ignoring_damage_notifications)
    }

    /// Suspends integrity validation and root stamping for mutations of `object`.
    pub fn set_ignoring_relationship_consistency(
        &mut self,
        object: ObjectHandle,
        ignore: bool,
    ) -> GraphResult<()> {
        self.record_mut(object)?.ignoring_relationship_consistency = ignore;
        Ok(())
    }

    pub fn is_ignoring_relationship_consistency(&self, object: ObjectHandle) -> GraphResult<bool> {
        Ok(self.record(object)?.ignoring_relationship_consistency)
    }

    /// Declared property names in schema order.
    pub fn property_names(&self, object: ObjectHandle) -> GraphResult<Vec<String>> {
        Ok(self
            .record(object)?
            .entity
            .property_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn persistent_property_names(&self, object: ObjectHandle) -> GraphResult<Vec<String>> {
        Ok(self
            .record(object)?
            .entity
            .persistent_property_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Value of the built-in `name` attribute, empty when unset.
    pub fn display_name(&mut self, object: ObjectHandle) -> GraphResult<String> {
        let value = self.value_for_property(object, NAME_PROPERTY)?;
        Ok(value.as_text().unwrap_or_default().to_string())
    }

    /// Short description that never triggers fault loading.
    pub fn describe(&self, object: ObjectHandle) -> GraphResult<String> {
        let record = self.record(object)?;
        let name = record
            .storage
            .get(NAME_PROPERTY)
            .and_then(Value::as_text)
            .unwrap_or("");
        Ok(format!(
            "{}({}) state={} name={:?}",
            record.entity.name(),
            object.id(),
            record.state,
            name
        ))
    }

    /// Destroys a detached persistent object and its composite subtree.
    pub fn destroy_object(&mut self, object: ObjectHandle) -> GraphResult<()> {
        let record = self.record(object)?;
        if !record.state.is_persistent() {
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "destroy",
            });
        }
        if let Some(owner) = &record.owner {
            return Err(GraphError::InvalidArgument(format!(
                "object {} is still contained by {} in `{}`",
                object.id(),
                owner.parent,
                owner.property
            )));
        }
        if record.mutations_in_progress > 0 {
            return Err(GraphError::MutationInProgress(object.id()));
        }

        let subtree = self.all_strongly_contained_objects_including_self(object)?;
        for member in &subtree {
            if let Some(record) = self.objects.get_mut(&member.id()) {
                record.state = ObjectState::Destroyed;
                record.storage.clear();
                record.owner = None;
                record.root = None;
            }
            self.damaged.remove(&member.id());
        }
        info!(
            "event=object_destroy module=graph status=ok object={} subtree_size={}",
            object.id(),
            subtree.len()
        );
        Ok(())
    }

    pub(super) fn handle(&self, id: ObjectId) -> ObjectHandle {
        ObjectHandle::new(self.id, id)
    }

    pub(super) fn ensure_local(&self, object: ObjectHandle) -> GraphResult<()> {
        if object.context() != self.id {
            return Err(GraphError::InvalidArgument(format!(
                "handle {object} belongs to another context than {}",
                self.id
            )));
        }
        Ok(())
    }

    pub(super) fn record(&self, object: ObjectHandle) -> GraphResult<&ObjectRecord> {
        self.ensure_local(object)?;
        self.objects
            .get(&object.id())
            .ok_or(GraphError::UnknownObject(object))
    }

    pub(super) fn record_mut(&mut self, object: ObjectHandle) -> GraphResult<&mut ObjectRecord> {
        self.ensure_local(object)?;
        self.objects
            .get_mut(&object.id())
            .ok_or(GraphError::UnknownObject(object))
    }

    /// Fails for destroyed objects.
    pub(super) fn ensure_usable(&self, object: ObjectHandle, operation: &'static str) -> GraphResult<()> {
        let record = self.record(object)?;
        if record.state == ObjectState::Destroyed {
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation,
            });
        }
        Ok(())
    }

    pub(super) fn dispatch(&mut self, object: ObjectHandle, event: LifecycleEvent) {
        let Some(entity_name) = self
            .objects
            .get(&object.id())
            .map(|record| record.entity.name().to_string())
        else {
            return;
        };
        let Some(hooks) = self.hooks.get(&entity_name).cloned() else {
            return;
        };
        for hook in hooks {
            hook.handle(self, object, &event);
        }
    }
}
