//! Change notification pipeline.

use crate::graph::context::EditingContext;
use crate::graph::error::GraphResult;
use crate::graph::lifecycle::LifecycleEvent;
use crate::model::value::ObjectHandle;
use log::warn;

impl EditingContext {
    /// Opens a mutation bracket on `property` and dispatches `WillChange`.
    ///
    /// Every call must be paired with `did_change_value`.
    pub fn will_change_value(&mut self, object: ObjectHandle, property: &str) -> GraphResult<()> {
        self.record_mut(object)?.mutations_in_progress += 1;
        self.dispatch(
            object,
            LifecycleEvent::WillChange {
                property: property.to_string(),
            },
        );
        Ok(())
    }

    /// Closes a mutation bracket, reports damage and dispatches `DidChange`.
    ///
    /// Damage is recorded only for persistent objects, persistent properties,
    /// and while damage notifications are not ignored.
    pub fn did_change_value(&mut self, object: ObjectHandle, property: &str) -> GraphResult<()> {
        let record = self.record_mut(object)?;
        if record.mutations_in_progress == 0 {
            warn!(
                "event=did_change module=graph status=unbalanced object={} property={}",
                object.id(),
                property
            );
        } else {
            record.mutations_in_progress -= 1;
        }

        let damages = !record.ignoring_damage_notifications
            && record.state.is_persistent()
            && record
                .entity
                .property(property)
                .is_some_and(|descriptor| descriptor.persistent);
        if damages {
            self.damaged.insert(object.id());
        }

        self.dispatch(
            object,
            LifecycleEvent::DidChange {
                property: property.to_string(),
            },
        );
        Ok(())
    }
}
