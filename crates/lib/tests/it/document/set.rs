//! Set mutation tests

use docmap::{NodeRef, Slot};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_in_place_mutation_marks_set_modified() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": ["x", "y"]}));
    let session = ctx.session();
    let tags = set_field(session, post, "tags");

    assert!(!session.is_modified(tags).unwrap());
    assert_eq!(session.serialize_set_for_save(tags, false).unwrap(), None);

    let index = session.append(tags, "z").unwrap();
    assert_eq!(index, 2);
    assert!(session.is_modified(tags).unwrap());
    assert_eq!(
        session.serialize_set_for_save(tags, false).unwrap(),
        Some(json!(["x", "y", "z"]))
    );
}

#[test]
fn test_forced_serialization_of_clean_set() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": ["x"]}));
    let session = ctx.session();
    let tags = set_field(session, post, "tags");

    assert_eq!(
        session.serialize_set_for_save(tags, true).unwrap(),
        Some(json!(["x"]))
    );
}

#[test]
fn test_element_mutation_dirties_set() {
    let mut ctx = TestContext::new();
    let post = ctx.load(
        "posts",
        json!({"_id": 1, "comments": [{"text": "a"}, {"text": "b"}]}),
    );
    let session = ctx.session();
    let comments = set_field(session, post, "comments");
    let second = session
        .element(comments, 1)
        .unwrap()
        .and_then(|slot| slot.as_entity())
        .unwrap();

    session.set(second, "text", "edited").unwrap();

    assert!(session.is_modified(comments).unwrap());
    assert_eq!(
        session.serialize_set_for_save(comments, false).unwrap(),
        Some(json!([{"text": "a"}, {"text": "edited"}]))
    );
}

#[test]
fn test_elements_are_placed_at_placeholder_path() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "comments": []}));
    let session = ctx.session();
    let comments = set_field(session, post, "comments");

    session.append(comments, json!({"text": "hi"})).unwrap();
    let comment = session
        .element(comments, 0)
        .unwrap()
        .and_then(|slot| slot.as_entity())
        .unwrap();

    assert_eq!(session.path(comment).unwrap(), "comments.$");
    assert_eq!(session.collection(comment).unwrap(), "posts.comments.$");
    assert_eq!(session.parent(comment).unwrap(), Some(NodeRef::Set(comments)));
    assert_eq!(session.parent_entity(comment).unwrap(), Some(post));
}

#[test]
fn test_insert_remove_and_clear() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": ["b", "d"]}));
    let session = ctx.session();
    let tags = set_field(session, post, "tags");

    session.insert_element(tags, 0, "a").unwrap();
    session.insert_element(tags, 2, "c").unwrap();
    assert_eq!(
        session.elements_json(tags).unwrap(),
        vec![json!("a"), json!("b"), json!("c"), json!("d")]
    );

    session.remove_element(tags, 1).unwrap();
    assert_eq!(
        session.elements(tags).unwrap(),
        vec![
            Slot::Scalar(json!("a")),
            Slot::Scalar(json!("c")),
            Slot::Scalar(json!("d"))
        ]
    );

    session.clear(tags).unwrap();
    assert!(session.is_empty(tags).unwrap());
    assert!(session.is_modified(tags).unwrap());
}

#[test]
fn test_assigning_set_to_field() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1}));
    let session = ctx.session();

    let set = session.create_set().unwrap();
    session.append(set, json!({"name": "x"})).unwrap();
    session.set(post, "items", set).unwrap();

    assert_eq!(session.parent(set).unwrap(), Some(NodeRef::Entity(post)));
    assert_eq!(session.path(set).unwrap(), "items");
    let item = session
        .element(set, 0)
        .unwrap()
        .and_then(|slot| slot.as_entity())
        .unwrap();
    assert_eq!(session.collection(item).unwrap(), "posts.items.$");
}
