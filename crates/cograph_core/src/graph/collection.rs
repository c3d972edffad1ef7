//! Collection mutation with integrity checks.
//!
//! Each call is one unit: validate, will-change, mutate, consistency update,
//! did-change. Validation failures return before any hook fires.

use crate::graph::context::EditingContext;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::fault::check_element;
use crate::model::schema::PropertyDescriptor;
use crate::model::value::{ObjectHandle, Value};
use log::debug;

impl EditingContext {
    /// Appends a member; unordered collections ignore existing members.
    pub fn add_object(&mut self, object: ObjectHandle, property: &str, value: Value) -> GraphResult<()> {
        self.insert_member(object, property, value, None)
    }

    /// Inserts a member at `index` (ordered collections) or adds it
    /// (unordered collections, where `index` is ignored).
    pub fn insert_object_at(
        &mut self,
        object: ObjectHandle,
        property: &str,
        value: Value,
        index: usize,
    ) -> GraphResult<()> {
        self.insert_member(object, property, value, Some(index))
    }

    /// Removes the first occurrence of `value`.
    pub fn remove_object(&mut self, object: ObjectHandle, property: &str, value: &Value) -> GraphResult<()> {
        let (descriptor, items) = self.load_members(object, property)?;
        let position = items.iter().position(|item| item == value).ok_or_else(|| {
            GraphError::InvalidArgument(format!("value is not a member of `{property}`"))
        })?;
        self.remove_member(object, &descriptor, items, position)
    }

    /// Removes the member stored at `index`.
    pub fn remove_object_at(&mut self, object: ObjectHandle, property: &str, index: usize) -> GraphResult<()> {
        let (descriptor, items) = self.load_members(object, property)?;
        if index >= items.len() {
            return Err(GraphError::InvalidArgument(format!(
                "index {index} out of bounds for `{property}` with {} members",
                items.len()
            )));
        }
        self.remove_member(object, &descriptor, items, index)
    }

    fn insert_member(
        &mut self,
        object: ObjectHandle,
        property: &str,
        value: Value,
        index: Option<usize>,
    ) -> GraphResult<()> {
        let (descriptor, mut items) = self.load_members(object, property)?;
        check_element(&descriptor, &value)?;
        self.ensure_known_refs(&value)?;

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
            if items.contains(&value) {
                debug!(
                    "event=collection_add module=graph status=skipped object={} property={} reason=duplicate",
                    object.id(),
                    property
                );
                return Ok(());
            }
            items.len()
        };

        let child = value.as_object().filter(|_| descriptor.is_composite());
        if let Some(child) = child {
            self.check_composite_insert(object, property, &[child])?;
        }

        self.will_change_value(object, property)?;
        items.insert(position, value);
        self.store_value(object, property, Value::List(items))?;
        if let Some(child) = child {
            self.attach_child(object, property, child);
        }
        self.did_change_value(object, property)
    }

    fn remove_member(
        &mut self,
        object: ObjectHandle,
        descriptor: &PropertyDescriptor,
        mut items: Vec<Value>,
        position: usize,
    ) -> GraphResult<()> {
        let property = descriptor.name.as_str();
        self.will_change_value(object, property)?;
        let removed = items.remove(position);
        let still_member = items.contains(&removed);
        self.store_value(object, property, Value::List(items))?;
        if descriptor.is_composite() && !still_member {
            if let Some(child) = removed.as_object() {
                self.detach_child(object, child);
            }
        }
        self.did_change_value(object, property)
    }

    fn load_members(
        &mut self,
        object: ObjectHandle,
        property: &str,
    ) -> GraphResult<(PropertyDescriptor, Vec<Value>)> {
        self.unfault_if_needed(object)?;
        self.ensure_usable(object, "mutate collection of")?;
        let descriptor = self.descriptor(object, property)?;
        if !descriptor.is_multivalued() {
            return Err(GraphError::InvalidArgument(format!(
                "`{property}` is single-valued; use set_value"
            )));
        }
        match self.record(object)?.value_or_empty(&descriptor) {
            Value::List(items) => Ok((descriptor, items)),
            other => Err(GraphError::InvalidValue {
                property: property.to_string(),
                message: format!("stored value is {}, not a list", other.kind_name()),
            }),
        }
    }
}
