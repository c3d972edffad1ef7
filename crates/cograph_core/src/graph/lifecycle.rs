//! Lifecycle events and per-entity hook table entries.

use crate::graph::context::EditingContext;
use crate::model::value::ObjectHandle;

/// Closed set of events dispatched to lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Object was created for the first time (not fired for faults).
    DidCreate,
    /// Object became persistent.
    AwakeFromInsert,
    /// Fault was resolved from the backing store.
    AwakeFromFetch,
    WillTurnIntoFault,
    DidTurnIntoFault,
    WillChange { property: String },
    DidChange { property: String },
}

/// Behavior attached to one entity kind.
///
/// Hooks receive the context mutably and may read or write the object, e.g.
/// to set defaults on `DidCreate`.
pub trait LifecycleHook {
    fn handle(&self, context: &mut EditingContext, object: ObjectHandle, event: &LifecycleEvent);
}

impl<F> LifecycleHook for F
where
    F: Fn(&mut EditingContext, ObjectHandle, &LifecycleEvent),
{
    fn handle(&self, context: &mut EditingContext, object: ObjectHandle, event: &LifecycleEvent) {
        self(context, object, event)
    }
}
