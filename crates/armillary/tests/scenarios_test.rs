//! Integration tests for the store's observable guarantees
//!
//! These tests drive the public API end to end: staging, committing, undo and
//! redo, and the composite engine operations.

use std::{cell::RefCell, rc::Rc};

use armillary::{
    ModelError, MutationEntry, Operation, OperationDirection, Repository,
    element::Element,
    identifier::{ElementId, Name},
    kind::field,
    value::Value,
};

fn project() -> Repository {
    Repository::new(Element::project("Scenario"))
}

/// Commits a model under `parent` with the raw builder API.
fn insert_model(repo: &mut Repository, parent: ElementId, model: Element) -> ElementId {
    let mut builder = repo.begin("Insert model");
    let id = builder.insert(model);
    builder.field_insert(parent, field::OWNED_ELEMENTS, id);
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");
    id
}

#[test]
fn test_insert_undo_redo_roundtrip() {
    let mut repo = project();
    let root = repo.root();
    let model = Element::model("UMLClass", "Customer").with_field("isAbstract", true);
    let expected = model.clone();

    let id = insert_model(&mut repo, root, model);
    let committed = repo.get(id).expect("Model should be live");
    assert_eq!(committed.fields().count(), expected.fields().count());
    assert_eq!(committed.name(), Some("Customer"));

    repo.undo().expect("Undo failed");
    assert!(matches!(repo.get(id), Err(ModelError::NotFound(_))));

    repo.redo().expect("Redo failed");
    let restored = repo.get(id).expect("Model should be live again");
    assert_eq!(restored.get("isAbstract"), &Value::Bool(true));
    assert_eq!(restored.name(), Some("Customer"));
    assert_eq!(restored.parent(), Some(root));
}

#[test]
fn test_deleting_endpoint_deletes_relationship() {
    let mut repo = project();
    let root = repo.root();
    let a = insert_model(&mut repo, root, Element::model("UMLClass", "A"));
    let b = insert_model(&mut repo, root, Element::model("UMLClass", "B"));

    let mut builder = repo.begin("Add dependency");
    let both_live = builder.is_live(a) && builder.is_live(b);
    builder
        .ensure(both_live, "both ends must exist")
        .expect("Ends are live");
    let parent = builder.element(a).and_then(Element::parent).expect("A is owned");
    let rel = builder.insert(Element::directed_relationship("UMLDependency", a, b));
    builder.field_insert(parent, field::OWNED_ELEMENTS, rel);
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");
    let before = repo.snapshot();
    let undo_depth = repo.history().undo_len();

    let commit = repo
        .engine()
        .delete_elements(&[a], &[])
        .expect("Delete failed");

    assert!(commit.deleted().contains(&a));
    assert!(commit.deleted().contains(&rel));
    assert!(!repo.contains(rel));
    assert!(repo.verify_integrity().is_empty());
    assert_eq!(repo.history().undo_len(), undo_depth + 1);

    repo.undo().expect("Undo failed");
    assert!(repo.contains(a));
    assert!(repo.contains(rel));
    assert_eq!(repo.snapshot(), before);
}

#[test]
fn test_failed_precondition_leaves_store_untouched() {
    let mut repo = project();
    let root = repo.root();
    insert_model(&mut repo, root, Element::model("UMLClass", "Existing"));
    repo.checkpoint();
    let before = repo.snapshot();

    let staged = {
        let mut builder = repo.begin("Place");
        let id = builder.insert(Element::model("UMLClass", "X"));
        builder.field_insert(root, field::OWNED_ELEMENTS, id);
        let err = builder
            .ensure(false, "X cannot be placed here")
            .expect_err("Precondition should fail");
        assert_eq!(err.to_string(), "X cannot be placed here");
        assert!(builder.end().is_err());
        id
    };

    assert!(!repo.is_modified());
    assert!(repo.get(staged).is_err());
    assert_eq!(repo.snapshot(), before);
    assert_eq!(repo.instances_of_type("UMLClass").count(), 1);
}

#[test]
fn test_commit_after_undo_truncates_redo() {
    let mut repo = project();
    let root = repo.root();
    for name in ["First", "Second", "Third"] {
        insert_model(&mut repo, root, Element::model("UMLClass", name));
    }

    repo.undo().expect("Undo failed");
    repo.undo().expect("Undo failed");
    assert!(repo.can_redo());

    insert_model(&mut repo, root, Element::model("UMLClass", "Fourth"));
    let before = repo.snapshot();

    assert!(!repo.can_redo());
    assert!(repo.redo().expect("Redo failed").is_none());
    assert_eq!(repo.snapshot(), before);
}

#[test]
fn test_positional_insert_and_inverse() {
    let mut repo = project();
    let root = repo.root();
    let list = insert_model(&mut repo, root, Element::model("UMLEnumeration", "Colors"));

    let mut builder = repo.begin("Add literals");
    builder.field_insert(list, "items", "red");
    builder.field_insert(list, "items", "green");
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");

    let mut builder = repo.begin("Prepend literal");
    builder.field_insert_at(list, "items", "blue", 0);
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");

    let items = |repo: &Repository| repo.get(list).expect("List is live").get("items").clone();
    assert_eq!(
        items(&repo),
        Value::List(vec!["blue".into(), "red".into(), "green".into()])
    );

    repo.undo().expect("Undo failed");
    assert_eq!(items(&repo), Value::List(vec!["red".into(), "green".into()]));
}

#[test]
fn test_field_remove_inverse_restores_position() {
    let mut repo = project();
    let root = repo.root();
    let list = insert_model(&mut repo, root, Element::model("UMLEnumeration", "Sizes"));
    let mut builder = repo.begin("Add literals");
    for literal in ["S", "M", "L"] {
        builder.field_insert(list, "items", literal);
    }
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");
    let before = repo.snapshot();

    let mut builder = repo.begin("Remove literal");
    builder.field_remove(list, "items", "M");
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");
    repo.undo().expect("Undo failed");

    assert_eq!(repo.snapshot(), before);
}

#[test]
fn test_each_entry_kind_inverts_exactly() {
    let mut repo = project();
    let root = repo.root();
    let a = insert_model(&mut repo, root, Element::model("UMLClass", "A"));
    let b = insert_model(&mut repo, root, Element::model("UMLClass", "B"));
    let before = repo.snapshot();

    let mut builder = repo.begin("Everything");
    let c = builder.insert(Element::model("UMLClass", "C"));
    builder.field_insert(a, field::OWNED_ELEMENTS, c);
    builder
        .field_assign(b, field::NAME, "Renamed")
        .expect("B is live");
    builder.field_remove(root, field::OWNED_ELEMENTS, b);
    builder.field_insert_at(a, field::OWNED_ELEMENTS, b, 0);
    let operation = builder.end().expect("Failed to stage");
    repo.do_operation(operation).expect("Failed to commit");

    assert_eq!(repo.children_of(a, field::OWNED_ELEMENTS), vec![b, c]);
    assert!(repo.verify_integrity().is_empty());

    repo.undo().expect("Undo failed");
    assert_eq!(repo.snapshot(), before);
}

#[test]
fn test_listener_sees_every_commit() {
    let mut repo = project();
    let root = repo.root();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    repo.subscribe(move |event| {
        sink.borrow_mut()
            .push((event.direction(), event.commit().inserted().to_vec()));
    });

    let id = insert_model(&mut repo, root, Element::model("UMLClass", "A"));
    repo.undo().expect("Undo failed");

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (OperationDirection::Executed, vec![id]));
    assert_eq!(seen[1].0, OperationDirection::Undone);
}

#[test]
fn test_cloned_element_is_detached_from_store() {
    let mut repo = project();
    let root = repo.root();
    let id = insert_model(&mut repo, root, Element::model("UMLClass", "Original"));

    let mut copy = repo.get(id).expect("Model is live").clone();
    copy.set_field(field::NAME, "Changed");

    assert_eq!(repo.get(id).expect("Model is live").name(), Some("Original"));
    assert_eq!(repo.undo_label(), Some("Insert model"));
}

#[test]
fn test_raw_operation_with_unknown_target_is_rejected() {
    let mut repo = project();
    let before = repo.snapshot();
    let operation = Operation::new(
        "Rename ghost",
        vec![MutationEntry::FieldAssign {
            target: ElementId::next(),
            field: Name::new(field::NAME),
            old: Value::Null,
            new: "Ghost".into(),
        }],
    );

    assert!(matches!(
        repo.do_operation(operation),
        Err(ModelError::Integrity(_))
    ));
    assert_eq!(repo.snapshot(), before);
    assert!(!repo.can_undo());
}

#[test]
#[should_panic(expected = "still referenced")]
fn test_dangling_delete_is_fatal() {
    let mut repo = project();
    let root = repo.root();
    let a = insert_model(&mut repo, root, Element::model("UMLClass", "A"));
    let diagram = insert_model(&mut repo, root, Element::diagram("UMLClassDiagram", "D"));
    let view = Element::node_view("UMLClassView", Some(a));
    repo.engine().add_view(diagram, view).expect("Failed to add view");

    let mut builder = repo.begin("Delete model only");
    builder.field_remove(root, field::OWNED_ELEMENTS, a);
    builder.delete(a);
    let operation = builder.end().expect("Failed to stage");
    let _ = repo.do_operation(operation);
}
