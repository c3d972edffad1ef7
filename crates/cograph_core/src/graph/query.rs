//! Query seam.
//!
//! Predicate evaluation belongs to the caller; the graph only wraps a match.

use crate::graph::context::EditingContext;
use crate::graph::error::GraphResult;
use crate::model::value::ObjectHandle;

/// Predicate evaluated against a single object.
pub trait ObjectQuery {
    fn matches(&self, context: &EditingContext, object: ObjectHandle) -> bool;
}

impl<F> ObjectQuery for F
where
    F: Fn(&EditingContext, ObjectHandle) -> bool,
{
    fn matches(&self, context: &EditingContext, object: ObjectHandle) -> bool {
        self(context, object)
    }
}

impl EditingContext {
    /// `[object]` when it matches `query`, otherwise an empty vector.
    ///
    /// Faults are resolved first so the predicate sees loaded storage.
    pub fn objects_matching_query(
        &mut self,
        object: ObjectHandle,
        query: &dyn ObjectQuery,
    ) -> GraphResult<Vec<ObjectHandle>> {
        self.unfault_if_needed(object)?;
        if query.matches(self, object) {
            Ok(vec![object])
        } else {
            Ok(Vec::new())
        }
    }
}
