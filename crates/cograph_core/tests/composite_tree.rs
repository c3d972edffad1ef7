mod common;

use cograph_core::{
    EditingContext, GraphError, IntegrityViolation, MemoryObjectStore, ObjectHandle, Value,
};
use common::{commit, context_over, context_with_store, Schema};
use uuid::Uuid;

fn document_with_pages(
    context: &mut EditingContext,
    schema: &Schema,
    count: usize,
) -> (ObjectHandle, Vec<ObjectHandle>) {
    let document = context.insert_object(&schema.document, None).unwrap();
    let pages = (0..count)
        .map(|_| {
            let page = context.create_object(&schema.page).unwrap();
            context.add_object(document, "pages", Value::Object(page)).unwrap();
            page
        })
        .collect();
    (document, pages)
}

fn members(context: &mut EditingContext, object: ObjectHandle, property: &str) -> Vec<ObjectHandle> {
    context
        .value_for_property(object, property)
        .unwrap()
        .object_refs()
}

#[test]
fn every_rooted_object_is_contained_by_its_root() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 2);
    let nested = context.create_object(&schema.page).unwrap();
    context
        .add_object(pages[1], "children", Value::Object(nested))
        .unwrap();
    let cover = context.create_object(&schema.page).unwrap();
    context.set_value(document, "cover", Value::Object(cover)).unwrap();

    let contained = context
        .all_strongly_contained_objects_including_self(document)
        .unwrap();
    assert_eq!(contained, vec![document, pages[0], pages[1], nested, cover]);

    for object in [document, pages[0], pages[1], nested, cover] {
        let root = context.root_object(object).unwrap().unwrap();
        assert!(context
            .all_strongly_contained_objects_including_self(root)
            .unwrap()
            .contains(&object));
    }
}

#[test]
fn move_object_reparents_in_one_step() {
    let (mut context, _store, schema) = context_with_store();
    let (source, pages) = document_with_pages(&mut context, &schema, 2);
    let (target, _) = document_with_pages(&mut context, &schema, 0);

    context.move_object(pages[0], target, "pages", None).unwrap();

    assert_eq!(
        context.owner_of(pages[0]).unwrap(),
        Some((target, "pages".to_string()))
    );
    assert_eq!(members(&mut context, source, "pages"), vec![pages[1]]);
    assert_eq!(members(&mut context, target, "pages"), vec![pages[0]]);
    assert_eq!(context.root_object(pages[0]).unwrap(), Some(target));
    assert!(context.is_damaged(source));
    assert!(context.is_damaged(target));
}

#[test]
fn move_within_ordered_slot_reorders() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 3);

    context.move_object(pages[2], document, "pages", Some(0)).unwrap();

    assert_eq!(
        members(&mut context, document, "pages"),
        vec![pages[2], pages[0], pages[1]]
    );
    assert_eq!(
        context.owner_of(pages[2]).unwrap(),
        Some((document, "pages".to_string()))
    );
}

#[test]
fn move_into_single_slot_detaches_previous_occupant() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 1);
    let old_cover = context.create_object(&schema.page).unwrap();
    context.set_value(document, "cover", Value::Object(old_cover)).unwrap();

    context.move_object(pages[0], document, "cover", None).unwrap();

    assert_eq!(
        context.value_for_property(document, "cover").unwrap(),
        Value::Object(pages[0])
    );
    assert!(members(&mut context, document, "pages").is_empty());
    assert_eq!(context.owner_of(old_cover).unwrap(), None);
    assert_eq!(context.root_object(old_cover).unwrap(), None);
}

#[test]
fn move_under_own_descendant_is_a_cycle() {
    let (mut context, _store, schema) = context_with_store();
    let (_document, pages) = document_with_pages(&mut context, &schema, 1);
    let child = context.create_object(&schema.page).unwrap();
    context.add_object(pages[0], "children", Value::Object(child)).unwrap();

    let err = context
        .move_object(pages[0], child, "children", None)
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::Cycle { .. })
    ));
    assert_eq!(members(&mut context, pages[0], "children"), vec![child]);
}

#[test]
fn inserting_into_second_owner_is_rejected() {
    let (mut context, _store, schema) = context_with_store();
    let (first, pages) = document_with_pages(&mut context, &schema, 1);
    let (second, _) = document_with_pages(&mut context, &schema, 0);

    let err = context
        .add_object(second, "pages", Value::Object(pages[0]))
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::AlreadyContained { owner, .. })
            if owner == first.id()
    ));
    assert!(members(&mut context, second, "pages").is_empty());
}

#[test]
fn self_and_ancestor_containment_are_rejected() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 1);
    let child = context.create_object(&schema.page).unwrap();
    context.add_object(pages[0], "children", Value::Object(child)).unwrap();

    assert!(matches!(
        context.add_object(child, "children", Value::Object(child)),
        Err(GraphError::IntegrityViolation(
            IntegrityViolation::SelfContainment { .. }
        ))
    ));

    assert!(matches!(
        context.add_object(child, "children", Value::Object(document)),
        Err(GraphError::IntegrityViolation(IntegrityViolation::Cycle { .. }))
    ));
    assert!(members(&mut context, child, "children").is_empty());
    assert_eq!(context.owner_of(document).unwrap(), None);
}

#[test]
fn duplicate_member_in_one_write_is_rejected() {
    let (mut context, _store, schema) = context_with_store();
    let (document, _) = document_with_pages(&mut context, &schema, 0);
    let page = context.create_object(&schema.page).unwrap();

    let err = context
        .set_value(
            document,
            "pages",
            Value::List(vec![Value::Object(page), Value::Object(page)]),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::AlreadyContained { .. })
    ));
    assert_eq!(context.owner_of(page).unwrap(), None);
}

#[test]
fn persistent_child_cannot_join_new_parent() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 1);
    context.remove_object_at(document, "pages", 0).unwrap();
    let draft = context.create_object(&schema.page).unwrap();

    let err = context
        .add_object(draft, "children", Value::Object(pages[0]))
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::PersistentChildOfNewParent { .. })
    ));
}

#[test]
fn removed_child_is_detached_and_can_be_promoted() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 1);
    let nested = context.create_object(&schema.page).unwrap();
    context.add_object(pages[0], "children", Value::Object(nested)).unwrap();

    context
        .remove_object(document, "pages", &Value::Object(pages[0]))
        .unwrap();

    assert_eq!(context.owner_of(pages[0]).unwrap(), None);
    assert_eq!(context.root_object(pages[0]).unwrap(), None);
    assert_eq!(context.root_object(nested).unwrap(), None);
    assert!(context.is_persistent(pages[0]).unwrap());

    context.promote_to_root(pages[0]).unwrap();
    assert!(context.is_root(pages[0]).unwrap());
    assert_eq!(context.root_object(nested).unwrap(), Some(pages[0]));
}

#[test]
fn reattaching_detached_child_restamps_root() {
    let (mut context, _store, schema) = context_with_store();
    let (first, pages) = document_with_pages(&mut context, &schema, 1);
    let (second, _) = document_with_pages(&mut context, &schema, 0);
    context.remove_object_at(first, "pages", 0).unwrap();

    context.add_object(second, "pages", Value::Object(pages[0])).unwrap();

    assert_eq!(context.root_object(pages[0]).unwrap(), Some(second));
}

#[test]
fn unordered_collections_have_set_semantics() {
    let (mut context, _store, schema) = context_with_store();
    let (document, _) = document_with_pages(&mut context, &schema, 0);

    context.add_object(document, "labels", Value::from("draft")).unwrap();
    context.add_object(document, "labels", Value::from("draft")).unwrap();
    context
        .insert_object_at(document, "labels", Value::from("final"), 0)
        .unwrap();

    assert_eq!(
        context.value_for_property(document, "labels").unwrap(),
        Value::List(vec!["draft".into(), "final".into()])
    );
}

#[test]
fn removing_non_member_is_invalid_argument() {
    let (mut context, _store, schema) = context_with_store();
    let (document, _) = document_with_pages(&mut context, &schema, 0);

    assert!(matches!(
        context.remove_object(document, "labels", &Value::from("missing")),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        context.remove_object_at(document, "pages", 3),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        context.insert_object_at(document, "pages", Value::Null, 0),
        Err(GraphError::InvalidValue { .. })
    ));
}

#[test]
fn ignoring_consistency_skips_validation_and_root_stamping() {
    let (mut context, _store, schema) = context_with_store();
    let (first, pages) = document_with_pages(&mut context, &schema, 1);
    let (second, _) = document_with_pages(&mut context, &schema, 0);
    context
        .set_ignoring_relationship_consistency(second, true)
        .unwrap();

    context.add_object(second, "pages", Value::Object(pages[0])).unwrap();

    assert_eq!(
        context.owner_of(pages[0]).unwrap(),
        Some((second, "pages".to_string()))
    );
    assert_eq!(context.root_object(pages[0]).unwrap(), Some(first));
}

#[test]
fn copy_object_duplicates_composite_subtree() {
    let (mut context, _store, schema) = context_with_store();
    let (document, pages) = document_with_pages(&mut context, &schema, 1);
    let friend = context.create_object(&schema.page).unwrap();
    context.add_object(pages[0], "related", Value::Object(friend)).unwrap();
    context.set_value(pages[0], "body", Value::from("text")).unwrap();

    let copy = context.copy_object(pages[0]).unwrap();

    assert_ne!(copy, pages[0]);
    assert!(!context.is_persistent(copy).unwrap());
    assert_eq!(context.value_for_property(copy, "body").unwrap(), Value::from("text"));
    assert_eq!(members(&mut context, copy, "related"), vec![friend]);
    assert_eq!(members(&mut context, document, "pages"), vec![pages[0]]);
}

/// Commits `first.pages = [shared]`, `second.pages = [linker]` and
/// `linker.related = [shared]`; returns the three identities.
fn commit_shared_page_layout(
    context: &mut EditingContext,
    store: &MemoryObjectStore,
    schema: &Schema,
) -> (Uuid, Uuid, Uuid) {
    let (first, first_pages) = document_with_pages(context, schema, 1);
    let (second, second_pages) = document_with_pages(context, schema, 1);
    context
        .add_object(second_pages[0], "related", Value::Object(first_pages[0]))
        .unwrap();
    commit(context, store);
    (first.id(), second.id(), first_pages[0].id())
}

#[test]
fn page_reached_by_reference_keeps_its_stored_owner() {
    let (mut writer, store, schema) = context_with_store();
    let (first_id, second_id, shared_id) =
        commit_shared_page_layout(&mut writer, &store, &schema);

    let mut context = context_over(&store, &schema);
    let second = context.fault_for_id(second_id, "Document").unwrap();
    let linker = members(&mut context, second, "pages")[0];
    let shared = members(&mut context, linker, "related")[0];
    assert_eq!(context.owner_of(shared).unwrap(), None);

    let err = context
        .add_object(second, "pages", Value::Object(shared))
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::AlreadyContained { object, owner, .. })
            if object == shared_id && owner == first_id
    ));
    assert_eq!(members(&mut context, second, "pages"), vec![linker]);
    assert!(!context.is_damaged(second));

    let first = context.fault_for_id(first_id, "Document").unwrap();
    assert_eq!(members(&mut context, first, "pages"), vec![shared]);
    assert_eq!(
        context.owner_of(shared).unwrap(),
        Some((first, "pages".to_string()))
    );
}

#[test]
fn stale_stored_owner_does_not_block_reinsertion() {
    let (mut writer, store, schema) = context_with_store();
    let (first_id, second_id, _) = commit_shared_page_layout(&mut writer, &store, &schema);

    let mut context = context_over(&store, &schema);
    let first = context.fault_for_id(first_id, "Document").unwrap();
    let second = context.fault_for_id(second_id, "Document").unwrap();
    let shared = members(&mut context, first, "pages")[0];
    context.remove_object_at(first, "pages", 0).unwrap();

    context
        .add_object(second, "pages", Value::Object(shared))
        .unwrap();

    assert_eq!(
        context.owner_of(shared).unwrap(),
        Some((second, "pages".to_string()))
    );
    assert_eq!(context.root_object(shared).unwrap(), Some(second));
}

#[test]
fn move_object_releases_slot_of_unloaded_stored_owner() {
    let (mut writer, store, schema) = context_with_store();
    let (first_id, second_id, _) = commit_shared_page_layout(&mut writer, &store, &schema);

    let mut context = context_over(&store, &schema);
    let first = context.fault_for_id(first_id, "Document").unwrap();
    let second = context.fault_for_id(second_id, "Document").unwrap();
    let linker = members(&mut context, second, "pages")[0];
    let shared = members(&mut context, linker, "related")[0];
    assert!(context.is_fault(first).unwrap());

    context.move_object(shared, second, "pages", None).unwrap();

    assert!(members(&mut context, first, "pages").is_empty());
    assert_eq!(members(&mut context, second, "pages"), vec![linker, shared]);
    assert_eq!(
        context.owner_of(shared).unwrap(),
        Some((second, "pages".to_string()))
    );
}

#[test]
fn loading_owner_of_already_owned_child_is_rejected() {
    let (mut writer, store, schema) = context_with_store();
    let (first_id, second_id, _) = commit_shared_page_layout(&mut writer, &store, &schema);

    let mut context = context_over(&store, &schema);
    let second = context.fault_for_id(second_id, "Document").unwrap();
    let linker = members(&mut context, second, "pages")[0];
    let shared = members(&mut context, linker, "related")[0];
    context
        .set_ignoring_relationship_consistency(second, true)
        .unwrap();
    context
        .add_object(second, "pages", Value::Object(shared))
        .unwrap();
    let first = context.fault_for_id(first_id, "Document").unwrap();

    let err = context.unfault_if_needed(first).unwrap_err();

    assert!(matches!(
        err,
        GraphError::IntegrityViolation(IntegrityViolation::AlreadyContained { owner, .. })
            if owner == second_id
    ));
    assert!(context.is_fault(first).unwrap());
    assert_eq!(
        context.owner_of(shared).unwrap(),
        Some((second, "pages".to_string()))
    );
}
