mod common;

use cograph_core::{
    EditingContext, GraphError, LoadError, MemoryObjectStore, ObjectLoader, ObjectState,
    StoredObject, Value,
};
use common::{commit, context_with_store, schema};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn insert_object_makes_root_resident_and_damaged() {
    let (mut context, _store, schema) = context_with_store();

    let document = context.insert_object(&schema.document, None).unwrap();

    assert_eq!(context.state(document).unwrap(), ObjectState::Resident);
    assert!(context.is_root(document).unwrap());
    assert_eq!(context.root_object(document).unwrap(), Some(document));
    assert!(context.is_damaged(document));
}

#[test]
fn fault_round_trip_restores_persistent_values() {
    let (mut context, store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();
    context
        .set_value(document, "title", Value::from("Quarterly report"))
        .unwrap();
    context
        .set_value(document, "labels", Value::List(vec!["draft".into(), "q3".into()]))
        .unwrap();
    commit(&mut context, &store);

    context.turn_into_fault(document).unwrap();
    assert!(context.is_fault(document).unwrap());
    assert_eq!(context.primitive_value(document, "title").unwrap(), None);

    assert_eq!(
        context.value_for_property(document, "title").unwrap(),
        Value::from("Quarterly report")
    );
    assert_eq!(
        context.value_for_property(document, "labels").unwrap(),
        Value::List(vec!["draft".into(), "q3".into()])
    );
    assert_eq!(context.state(document).unwrap(), ObjectState::Resident);
    assert!(!context.is_damaged(document));
}

#[test]
fn unfault_is_idempotent_on_resident_objects() {
    let (mut context, store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();
    context.set_value(document, "title", Value::from("A")).unwrap();
    commit(&mut context, &store);
    let fetches = common::record_events(&mut context, "Document");

    context.unfault_if_needed(document).unwrap();
    context.unfault_if_needed(document).unwrap();

    assert!(fetches.borrow().is_empty());
    assert_eq!(context.value_for_property(document, "title").unwrap(), Value::from("A"));
}

#[test]
fn fresh_context_loads_root_and_children_lazily() {
    let (mut context, store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();
    let page = context.create_object(&schema.page).unwrap();
    context.set_value(page, "body", Value::from("hello")).unwrap();
    context.add_object(document, "pages", Value::Object(page)).unwrap();
    commit(&mut context, &store);

    let mut reader = EditingContext::new(store.clone());
    reader.register_entity(Arc::clone(&schema.document)).unwrap();
    reader.register_entity(Arc::clone(&schema.page)).unwrap();
    let loaded = reader.fault_for_id(document.id(), "Document").unwrap();
    assert!(reader.is_fault(loaded).unwrap());

    let pages = reader.value_for_property(loaded, "pages").unwrap();
    let loaded_page = pages.as_list().unwrap()[0].as_object().unwrap();
    assert_eq!(loaded_page.id(), page.id());
    assert!(reader.is_fault(loaded_page).unwrap());
    assert_eq!(reader.root_object(loaded_page).unwrap(), Some(loaded));
    assert_eq!(
        reader.owner_of(loaded_page).unwrap(),
        Some((loaded, "pages".to_string()))
    );

    assert_eq!(
        reader.value_for_property(loaded_page, "body").unwrap(),
        Value::from("hello")
    );
    assert_ne!(loaded_page, page);
}

struct FlakyLoader {
    inner: MemoryObjectStore,
    failures_left: Cell<u32>,
}

impl ObjectLoader for FlakyLoader {
    fn load_object(&self, id: Uuid) -> Result<StoredObject, LoadError> {
        if self.failures_left.get() > 0 {
            self.failures_left.set(self.failures_left.get() - 1);
            return Err(LoadError::Backend("disk unavailable".to_string()));
        }
        self.inner.load_object(id)
    }
}

#[test]
fn failed_load_leaves_fault_and_retry_succeeds() {
    let schema = schema();
    let id = Uuid::new_v4();
    let inner = MemoryObjectStore::new();
    inner.save(StoredObject {
        id,
        entity: "Document".to_string(),
        root: Some(id),
        owner: None,
        properties: [("title".to_string(), serde_json::json!("Recovered"))]
            .into_iter()
            .collect(),
    });
    let loader = Rc::new(FlakyLoader {
        inner,
        failures_left: Cell::new(1),
    });
    let mut context = EditingContext::new(loader);
    context.register_entity(Arc::clone(&schema.document)).unwrap();
    let document = context.fault_for_id(id, "Document").unwrap();

    let err = context.value_for_property(document, "title").unwrap_err();
    assert!(matches!(
        err,
        GraphError::FaultResolution {
            source: LoadError::Backend(_),
            ..
        }
    ));
    assert!(context.is_fault(document).unwrap());

    assert_eq!(
        context.value_for_property(document, "title").unwrap(),
        Value::from("Recovered")
    );
    assert!(context.is_root(document).unwrap());
}

#[test]
fn malformed_stored_data_is_reported_and_object_stays_fault() {
    let (mut context, store, _schema) = context_with_store();
    let id = Uuid::new_v4();
    store.save(StoredObject {
        id,
        entity: "Document".to_string(),
        root: Some(id),
        owner: None,
        properties: [("unknown".to_string(), serde_json::json!(1))]
            .into_iter()
            .collect(),
    });
    let document = context.fault_for_id(id, "Document").unwrap();

    let err = context.unfault_if_needed(document).unwrap_err();

    assert!(matches!(
        err,
        GraphError::FaultResolution {
            source: LoadError::Malformed(_),
            ..
        }
    ));
    assert!(context.is_fault(document).unwrap());
}

#[test]
fn become_persistent_rejects_invalid_requests() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();

    let err = context.become_persistent(document, document).unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));

    let page = context.create_object(&schema.page).unwrap();
    let other = context.create_object(&schema.page).unwrap();
    let err = context.become_persistent(page, other).unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));

    let mut foreign = EditingContext::new(Rc::new(MemoryObjectStore::new()));
    let foreign_root = foreign.insert_object(&schema.document, None).unwrap();
    let err = context.become_persistent(page, foreign_root).unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
    assert_eq!(context.state(page).unwrap(), ObjectState::New);
}

#[test]
fn become_persistent_persists_attached_new_subtree() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.create_object(&schema.document).unwrap();
    let page = context.create_object(&schema.page).unwrap();
    let child = context.create_object(&schema.page).unwrap();
    context.add_object(page, "children", Value::Object(child)).unwrap();
    context.add_object(document, "pages", Value::Object(page)).unwrap();
    assert!(!context.is_persistent(child).unwrap());

    context.become_persistent(document, document).unwrap();

    for object in [document, page, child] {
        assert_eq!(context.state(object).unwrap(), ObjectState::Resident);
        assert_eq!(context.root_object(object).unwrap(), Some(document));
        assert!(context.is_damaged(object));
    }
}

#[test]
fn object_persisted_under_foreign_root_reports_no_root_until_attached() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();
    let page = context.create_object(&schema.page).unwrap();

    context.become_persistent(page, document).unwrap();

    assert!(context.is_persistent(page).unwrap());
    assert_eq!(context.root_object(page).unwrap(), None);
    assert!(!context
        .all_strongly_contained_objects_including_self(document)
        .unwrap()
        .contains(&page));

    context.add_object(document, "pages", Value::Object(page)).unwrap();

    assert_eq!(context.root_object(page).unwrap(), Some(document));
    assert!(context
        .all_strongly_contained_objects_including_self(document)
        .unwrap()
        .contains(&page));
}

#[test]
fn damaged_object_cannot_turn_into_fault() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();

    let err = context.turn_into_fault(document).unwrap_err();

    assert!(matches!(err, GraphError::InvalidState { .. }));
    assert_eq!(context.state(document).unwrap(), ObjectState::Resident);
}

#[test]
fn new_objects_cannot_turn_into_faults() {
    let (mut context, _store, schema) = context_with_store();
    let page = context.create_object(&schema.page).unwrap();

    assert!(matches!(
        context.turn_into_fault(page),
        Err(GraphError::InvalidState {
            state: ObjectState::New,
            ..
        })
    ));
}

#[test]
fn fault_for_id_returns_existing_instance() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();

    assert_eq!(context.fault_for_id(document.id(), "Document").unwrap(), document);
    assert!(matches!(
        context.fault_for_id(document.id(), "Page"),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        context.fault_for_id(Uuid::new_v4(), "Missing"),
        Err(GraphError::UnknownEntity(_))
    ));
}

#[test]
fn destroy_object_marks_whole_subtree() {
    let (mut context, _store, schema) = context_with_store();
    let document = context.insert_object(&schema.document, None).unwrap();
    let page = context.create_object(&schema.page).unwrap();
    context.add_object(document, "pages", Value::Object(page)).unwrap();

    context.destroy_object(document).unwrap();

    assert_eq!(context.state(document).unwrap(), ObjectState::Destroyed);
    assert_eq!(context.state(page).unwrap(), ObjectState::Destroyed);
    assert!(context.damaged_objects().is_empty());
    assert!(matches!(
        context.set_value(document, "title", Value::from("x")),
        Err(GraphError::InvalidState { .. })
    ));
}
