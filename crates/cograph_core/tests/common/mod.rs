#![allow(dead_code)]

use cograph_core::{
    Cardinality, EditingContext, EntityDescriptor, LifecycleEvent, LifecycleHook,
    MemoryObjectStore, ObjectHandle,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub struct Schema {
    pub document: Arc<EntityDescriptor>,
    pub page: Arc<EntityDescriptor>,
}

/// `Document { title, pages (ordered composite), cover (composite),
/// labels (unordered attributes), selection (transient) }` and
/// `Page { body, children (ordered composite), related (unordered refs) }`.
pub fn schema() -> Schema {
    let document = EntityDescriptor::builder("Document")
        .attribute("title")
        .composite("pages", Cardinality::Ordered)
        .composite("cover", Cardinality::One)
        .attributes("labels", Cardinality::Unordered)
        .transient_attribute("selection")
        .build()
        .unwrap();
    let page = EntityDescriptor::builder("Page")
        .attribute("body")
        .composite("children", Cardinality::Ordered)
        .reference("related", Cardinality::Unordered)
        .build()
        .unwrap();
    Schema { document, page }
}

pub fn context_with_store() -> (EditingContext, Rc<MemoryObjectStore>, Schema) {
    let store = Rc::new(MemoryObjectStore::new());
    let schema = schema();
    let context = context_over(&store, &schema);
    (context, store, schema)
}

/// A second context reading the same store, with nothing loaded yet.
pub fn context_over(store: &Rc<MemoryObjectStore>, schema: &Schema) -> EditingContext {
    let mut context = EditingContext::new(store.clone());
    context.register_entity(Arc::clone(&schema.document)).unwrap();
    context.register_entity(Arc::clone(&schema.page)).unwrap();
    context
}

/// Writes a snapshot of every damaged object to `store` and clears damage.
pub fn commit(context: &mut EditingContext, store: &MemoryObjectStore) {
    for object in context.damaged_objects() {
        store.save(context.snapshot(object).unwrap());
    }
    context.clear_damage();
}

pub type EventLog = Rc<RefCell<Vec<(ObjectHandle, LifecycleEvent)>>>;

/// Registers a hook on `entity` that records every event it receives.
pub fn record_events(context: &mut EditingContext, entity: &str) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let hook: Rc<dyn LifecycleHook> = Rc::new(
        move |_: &mut EditingContext, object: ObjectHandle, event: &LifecycleEvent| {
            sink.borrow_mut().push((object, event.clone()));
        },
    );
    context.register_hook(entity, hook);
    log
}
