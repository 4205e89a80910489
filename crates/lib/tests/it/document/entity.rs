//! Entity field access and change tracking tests

use docmap::{Slot, document::DocumentError};
use serde_json::{Map, Value, json};

use crate::helpers::*;

#[test]
fn test_loaded_document_is_clean() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "title": "a", "meta": {"x": 1}}));
    let session = ctx.session();

    assert!(!session.is_modified(post).unwrap());
    assert!(!session.has_changes(post).unwrap());
    assert_eq!(session.id(post).unwrap(), Some(json!(1)));
    assert_eq!(session.keys(post).unwrap(), vec!["_id", "meta", "title"]);
}

#[test]
fn test_set_then_unset_new_field_nets_unmodified() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "title": "a"}));
    let session = ctx.session();

    // A field that never existed in the baseline
    session.set(post, "draft", true).unwrap();
    session.set(post, "draft", json!({"nested": 1})).unwrap();
    session.set(post, "draft", Value::Null).unwrap();
    assert!(!session.is_modified(post).unwrap());

    // A field from the baseline stays recorded as removed
    session.set(post, "title", "b").unwrap();
    session.set(post, "title", Value::Null).unwrap();
    assert!(session.is_modified(post).unwrap());
    assert_eq!(session.changed_fields(post).unwrap(), vec!["title"]);
    assert!(!session.contains(post, "title").unwrap());
}

#[test]
fn test_effective_data_ignores_operation_order() {
    let baseline = json!({"_id": 1, "a": 1, "b": 2, "c": 3});
    let expected = json!({"_id": 1, "a": 10, "d": 4});

    let orders: [&[(&str, Value)]; 3] = [
        &[("a", json!(10)), ("b", Value::Null), ("c", Value::Null), ("d", json!(4))],
        &[("d", json!(4)), ("c", Value::Null), ("a", json!(10)), ("b", Value::Null)],
        &[
            ("b", json!(7)),
            ("b", Value::Null),
            ("c", Value::Null),
            ("a", json!(5)),
            ("d", json!(4)),
            ("a", json!(10)),
        ],
    ];
    for operations in orders {
        let mut ctx = TestContext::new();
        let post = ctx.load("posts", baseline.clone());
        let session = ctx.session();
        for (field, value) in operations {
            session.set(post, field, value.clone()).unwrap();
        }
        assert_eq!(
            Value::Object(session.effective_data(post).unwrap()),
            expected
        );
    }
}

#[test]
fn test_invalid_field_name_mutates_nothing() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1}));
    let session = ctx.session();
    let nodes = session.node_count();

    let err = session.set(post, "a.b", 1).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::InvalidFieldName { ref field }) if field == "a.b"
    ));
    assert!(err.is_validation_error());
    assert!(!session.is_modified(post).unwrap());
    assert_eq!(session.node_count(), nodes);
}

#[test]
fn test_baseline_field_names_are_not_validated() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "weird.key": 1}));
    assert!(ctx.session().contains(post, "weird.key").unwrap());
}

#[test]
fn test_nested_objects_become_entities() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "author": {"name": "ann"}}));
    let session = ctx.session();

    let author = entity_field(session, post, "author");
    assert_eq!(session.collection(author).unwrap(), "posts.author");
    assert_field(session, author, "name", json!("ann"));

    // Embedded changes are deep, not shallow
    session.set(author, "name", "bob").unwrap();
    assert!(!session.is_modified(post).unwrap());
    assert!(session.has_changes(post).unwrap());
}

#[test]
fn test_positional_objects_become_sets() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": {"0": "a", "1": "b"}, "empty": {}}));
    let session = ctx.session();

    let tags = set_field(session, post, "tags");
    assert_eq!(session.len(tags).unwrap(), 2);
    let empty = set_field(session, post, "empty");
    assert!(session.is_empty(empty).unwrap());
}

#[test]
fn test_load_rejects_non_object() {
    let mut ctx = TestContext::new();
    let err = ctx.session().load("posts", json!("text")).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::InvalidDocumentData { found: "string", .. })
    ));
}

#[test]
fn test_unset_and_contains() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "title": "a"}));
    let session = ctx.session();

    session.unset(post, "title").unwrap();
    assert!(!session.contains(post, "title").unwrap());
    assert_eq!(session.get(post, "title").unwrap(), None);

    // Reassigning cancels the removal
    session.set(post, "title", "b").unwrap();
    assert_eq!(
        session.get(post, "title").unwrap(),
        Some(Slot::Scalar(json!("b")))
    );
    assert_eq!(session.changed_fields(post).unwrap(), vec!["title"]);
}

#[test]
fn test_effective_fields_keep_nodes_live() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": ["a"], "author": {"name": "ann"}}));
    let session = ctx.session();

    let fields = session.effective_fields(post).unwrap();
    assert!(matches!(fields["tags"], Slot::Set(_)));
    assert!(matches!(fields["author"], Slot::Entity(_)));

    let mut expected = Map::new();
    expected.insert("_id".into(), json!(1));
    expected.insert("author".into(), json!({"name": "ann"}));
    expected.insert("tags".into(), json!(["a"]));
    assert_eq!(session.effective_data(post).unwrap(), expected);
}

#[test]
fn test_replaced_assignment_leaves_node_with_caller() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1}));

    let session = ctx.session();
    session
        .events_mut(post)
        .unwrap()
        .on_set(docmap::events::pre_set_field("author"), |_, _, _| {
            Ok(docmap::events::HookOutcome::Replace(json!("anonymous")))
        });
    let author = session.create("users").unwrap();
    session.set(author, "name", "ann").unwrap();

    session.set(post, "author", author).unwrap();
    assert_field(session, post, "author", json!("anonymous"));

    // Still unowned and usable, so the caller can discard it
    assert_eq!(session.parent(author).unwrap(), None);
    assert_field(session, author, "name", json!("ann"));
    session.discard(author).unwrap();
    assert!(session.keys(author).is_err());
}
