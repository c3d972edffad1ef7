//! Composite subtree traversal.

use crate::graph::context::EditingContext;
use crate::graph::error::{GraphResult, IntegrityViolation};
use crate::model::value::ObjectHandle;
use std::collections::HashSet;

impl EditingContext {
    /// Objects strongly contained by `object`, depth-first pre-order.
    ///
    /// Properties are visited in schema order and collections in stored
    /// order. Faults met on the way are resolved.
    ///
    /// # Errors
    /// - `IntegrityViolation::Cycle` when an object is reached twice.
    /// - `FaultResolution` when a contained fault cannot be loaded.
    pub fn all_strongly_contained_objects(&mut self, object: ObjectHandle) -> GraphResult<Vec<ObjectHandle>> {
        let mut visited = HashSet::from([object.id()]);
        let mut result = Vec::new();
        let mut stack = self.composite_children_of(object)?;
        stack.reverse();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.id()) {
                return Err(self.reject(IntegrityViolation::Cycle {
                    object: current.id(),
                }));
            }
            result.push(current);
            let mut children = self.composite_children_of(current)?;
            children.reverse();
            stack.extend(children);
        }
        Ok(result)
    }

    pub fn all_strongly_contained_objects_including_self(
        &mut self,
        object: ObjectHandle,
    ) -> GraphResult<Vec<ObjectHandle>> {
        let mut result = vec![object];
        result.extend(self.all_strongly_contained_objects(object)?);
        Ok(result)
    }

    fn composite_children_of(&mut self, object: ObjectHandle) -> GraphResult<Vec<ObjectHandle>> {
        self.unfault_if_needed(object)?;
        let record = self.record(object)?;
        Ok(record
            .entity
            .composite_properties()
            .flat_map(|property| record.composite_children(property.name.as_str()))
            .map(|id| self.handle(id))
            .collect())
    }
}
