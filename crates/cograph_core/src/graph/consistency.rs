//! Relationship consistency for composite ownership trees.
//!
//! # Responsibility
//! - Reject insertions that would break the single-owner, acyclic tree.
//! - Record owner back-references and re-stamp root references on change.
//! - Provide the explicit reparenting operation.
//!
//! # Invariants
//! - An object already held by a composite slot is never silently inserted
//!   into a second one; `move_object` is the only reparenting path.
//! - Roots are stamped eagerly through resident objects; faults receive the
//!   root and hand it to their children when they load.

use crate::graph::context::EditingContext;
use crate::graph::error::{GraphError, GraphResult, IntegrityViolation};
use crate::graph::loader::{LoadError, StoredOwner};
use crate::graph::object::{ObjectState, Owner};
use crate::model::value::{ObjectHandle, ObjectId, Value};
use log::{debug, error, info};
use std::collections::HashSet;

impl EditingContext {
    /// Reparents `child` into a composite slot of `new_parent` in one unit.
    ///
    /// `index` positions the child in ordered collections (append when
    /// `None`) and is ignored otherwise. A child with no owner is simply
    /// inserted. A different object occupying a single-valued target slot is
    /// detached.
    ///
    /// # Errors
    /// - `InvalidArgument` when the target property is not composite or the
    ///   index is out of bounds.
    /// - `IntegrityViolation` when the move would create a cycle, or when
    ///   the child's stored owner is not loaded in this context.
    pub fn move_object(
        &mut self,
        child: ObjectHandle,
        new_parent: ObjectHandle,
        property: &str,
        index: Option<usize>,
    ) -> GraphResult<()> {
        self.ensure_local(child)?;
        self.unfault_if_needed(new_parent)?;
        self.ensure_usable(new_parent, "move into")?;
        let descriptor = self.descriptor(new_parent, property)?;
        if !descriptor.is_composite() {
            return Err(GraphError::InvalidArgument(format!(
                "move target `{property}` is not a composite property"
            )));
        }

        let child_record = self.record(child)?;
        if child_record.owner.is_none() && child_record.state.is_persistent() {
            // Load a stored owner known to this context so its slot is released.
            if let Some(claim) = self.stored_owner_claim(child)? {
                if self.objects.contains_key(&claim.parent) {
                    self.unfault_if_needed(self.handle(claim.parent))?;
                }
            }
        }

        let Some(owner) = self.record(child)?.owner.clone() else {
            return if !descriptor.is_multivalued() {
                self.set_value(new_parent, property, Value::Object(child))
            } else if let Some(index) = index {
                self.insert_object_at(new_parent, property, Value::Object(child), index)
            } else {
                self.add_object(new_parent, property, Value::Object(child))
            };
        };

        let old_parent = self.handle(owner.parent);
        self.unfault_if_needed(old_parent)?;
        if child == new_parent {
            return Err(self.reject(IntegrityViolation::SelfContainment {
                object: child.id(),
            }));
        }
        if self.is_ancestor(child.id(), new_parent.id()) {
            return Err(self.reject(IntegrityViolation::Cycle { object: child.id() }));
        }
        if self.record(new_parent)?.state == ObjectState::New
            && self.record(child)?.state.is_persistent()
        {
            return Err(self.reject(IntegrityViolation::PersistentChildOfNewParent {
                parent: new_parent.id(),
                child: child.id(),
            }));
        }

        let same_slot = owner.parent == new_parent.id() && owner.property == property;
        if same_slot && !descriptor.is_ordered() {
            return Ok(());
        }

        let old_descriptor = self.descriptor(old_parent, owner.property.as_str())?;
        let old_value = match self.record(old_parent)?.value_or_empty(&old_descriptor) {
            Value::List(mut items) => {
                items.retain(|item| item.as_object() != Some(child));
                Value::List(items)
            }
            _ => Value::Null,
        };

        let target_base = if same_slot {
            old_value.clone()
        } else {
            self.record(new_parent)?.value_or_empty(&descriptor)
        };
        let mut displaced = None;
        let target_value = match target_base {
            Value::List(mut items) => {
                let position = if descriptor.is_ordered() {
                    let position = index.unwrap_or(items.len());
                    if position > items.len() {
                        return Err(GraphError::InvalidArgument(format!(
                            "index {position} out of bounds for `{property}` with {} members",
                            items.len()
                        )));
                    }
                    position
                } else {
                    items.len()
                };
                items.insert(position, Value::Object(child));
                Value::List(items)
            }
            occupant => {
                displaced = occupant.as_object().filter(|current| *current != child);
                Value::Object(child)
            }
        };

        self.will_change_value(old_parent, owner.property.as_str())?;
        if !same_slot {
            self.will_change_value(new_parent, property)?;
            self.store_value(old_parent, owner.property.as_str(), old_value)?;
        }
        self.store_value(new_parent, property, target_value)?;
        if let Some(displaced) = displaced {
            self.detach_child(new_parent, displaced);
        }
        self.record_mut(child)?.owner = None;
        self.attach_child(new_parent, property, child);
        if !same_slot {
            self.did_change_value(new_parent, property)?;
        }
        self.did_change_value(old_parent, owner.property.as_str())?;

        info!(
            "event=object_move module=graph status=ok object={} from={} to={} property={}",
            child.id(),
            old_parent.id(),
            new_parent.id(),
            property
        );
        Ok(())
    }

    /// Turns a detached persistent object into the root of its subtree.
    pub fn promote_to_root(&mut self, object: ObjectHandle) -> GraphResult<()> {
        let record = self.record(object)?;
        if !record.state.is_persistent() {
            return Err(GraphError::InvalidState {
                id: object.id(),
                state: record.state,
                operation: "promote to root",
            });
        }
        if let Some(owner) = &record.owner {
            return Err(GraphError::InvalidArgument(format!(
                "object {} is contained by {} in `{}`",
                object.id(),
                owner.parent,
                owner.property
            )));
        }
        if record.root == Some(object.id()) {
            return Ok(());
        }

        self.record_mut(object)?.awaiting_attach = false;
        self.stamp_root(object.id(), Some(object.id()));
        self.damaged.insert(object.id());
        Ok(())
    }

    /// Validates incoming children of one composite slot of `parent`.
    pub(super) fn check_composite_insert(
        &self,
        parent: ObjectHandle,
        property: &str,
        children: &[ObjectHandle],
    ) -> GraphResult<()> {
        if self.record(parent)?.ignoring_relationship_consistency {
            debug!(
                "event=integrity_check module=graph status=skipped parent={} property={}",
                parent.id(),
                property
            );
            return Ok(());
        }
        for child in children {
            self.check_insert_one(parent, *child)?;
        }
        Ok(())
    }

    fn check_insert_one(&self, parent: ObjectHandle, child: ObjectHandle) -> GraphResult<()> {
        if child == parent {
            return Err(self.reject(IntegrityViolation::SelfContainment {
                object: child.id(),
            }));
        }

        let child_record = self.record(child)?;
        if let Some(owner) = &child_record.owner {
            return Err(self.reject(IntegrityViolation::AlreadyContained {
                object: child.id(),
                owner: owner.parent,
                property: owner.property.clone(),
            }));
        }
        if child_record.state.is_persistent() {
            if let Some(owner) = self.stored_owner_claim(child)? {
                return Err(self.reject(IntegrityViolation::AlreadyContained {
                    object: child.id(),
                    owner: owner.parent,
                    property: owner.property,
                }));
            }
        }
        if self.record(parent)?.state == ObjectState::New && child_record.state.is_persistent() {
            return Err(self.reject(IntegrityViolation::PersistentChildOfNewParent {
                parent: parent.id(),
                child: child.id(),
            }));
        }
        if self.is_ancestor(child.id(), parent.id()) {
            return Err(self.reject(IntegrityViolation::Cycle { object: child.id() }));
        }
        Ok(())
    }

    /// Owner recorded in the backing store for an object with no owner here.
    ///
    /// The stored slot still holds the object unless its parent is resident
    /// in this context and no longer lists it.
    fn stored_owner_claim(&self, child: ObjectHandle) -> GraphResult<Option<StoredOwner>> {
        let stored = match self.loader.load_object(child.id()) {
            Ok(stored) => stored,
            Err(LoadError::NotFound(_)) => return Ok(None),
            Err(source) => {
                return Err(GraphError::FaultResolution {
                    id: child.id(),
                    source,
                })
            }
        };
        let Some(owner) = stored.owner else {
            return Ok(None);
        };
        let live = match self.objects.get(&owner.parent) {
            None => true,
            Some(parent) => match parent.state {
                ObjectState::Fault => true,
                ObjectState::Resident => parent
                    .composite_children(owner.property.as_str())
                    .contains(&child.id()),
                ObjectState::New | ObjectState::Destroyed => false,
            },
        };
        Ok(live.then_some(owner))
    }

    /// Whether `candidate` is `of` or one of its composite ancestors.
    pub(super) fn is_ancestor(&self, candidate: ObjectId, of: ObjectId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(of);
        while let Some(current) = cursor {
            if current == candidate || !visited.insert(current) {
                return true;
            }
            cursor = self
                .objects
                .get(&current)
                .and_then(|record| record.owner.as_ref())
                .map(|owner| owner.parent);
        }
        false
    }

    pub(super) fn reject(&self, violation: IntegrityViolation) -> GraphError {
        error!(
            "event=integrity_violation module=graph status=rejected context={} detail={}",
            self.id, violation
        );
        GraphError::IntegrityViolation(violation)
    }

    /// Records `child` as owned by `(parent, property)` and updates roots.
    ///
    /// New children of persistent parents become persistent. Root stamping is
    /// skipped while the parent ignores relationship consistency.
    pub(super) fn attach_child(&mut self, parent: ObjectHandle, property: &str, child: ObjectHandle) {
        let Some(parent_record) = self.objects.get(&parent.id()) else {
            return;
        };
        let parent_persistent = parent_record.state.is_persistent();
        let parent_root = parent_record.root;
        let ignoring = parent_record.ignoring_relationship_consistency;

        let Some(child_record) = self.objects.get_mut(&child.id()) else {
            return;
        };
        child_record.owner = Some(Owner {
            parent: parent.id(),
            property: property.to_string(),
        });
        child_record.awaiting_attach = false;
        let child_state = child_record.state;

        if !parent_persistent {
            return;
        }
        if child_state == ObjectState::New {
            self.persist_subtree(child, parent_root);
        } else if !ignoring {
            self.stamp_root(child.id(), parent_root);
        }
    }

    /// Clears the owner of a removed child and detaches its subtree root.
    pub(super) fn detach_child(&mut self, parent: ObjectHandle, child: ObjectHandle) {
        let ignoring = self
            .objects
            .get(&parent.id())
            .is_some_and(|record| record.ignoring_relationship_consistency);
        let Some(child_record) = self.objects.get_mut(&child.id()) else {
            return;
        };
        if child_record
            .owner
            .as_ref()
            .is_some_and(|owner| owner.parent == parent.id())
        {
            child_record.owner = None;
        }
        if child_record.state.is_persistent() && !ignoring {
            self.stamp_root(child.id(), None);
        }
    }

    fn stamp_root(&mut self, start: ObjectId, root: Option<ObjectId>) {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(record) = self.objects.get_mut(&id) else {
                continue;
            };
            record.root = root;
            if record.state != ObjectState::Resident {
                continue;
            }
            for property in record.entity.composite_properties() {
                stack.extend(record.composite_children(property.name.as_str()));
            }
        }
    }
}
