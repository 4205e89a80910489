//! Save algorithm tests
//!
//! Inserts, partial updates, delegation of embedded saves to the owning
//! document, and the error cases of the save path.

use std::sync::{Arc, Mutex};

use docmap::{
    Session,
    document::DocumentError,
    events::{POST_INSERT, POST_SAVE, POST_UPDATE, PRE_INSERT, PRE_SAVE, PRE_UPDATE},
    store::in_memory::Operation,
};
use serde_json::{Value, json};

use crate::helpers::*;

#[test]
fn test_save_without_changes_issues_no_store_call() {
    let mut ctx = TestContext::new();
    let post = ctx.load(
        "posts",
        json!({"_id": 1, "title": "a", "tags": ["x"], "author": {"name": "ann"}}),
    );

    let saved = ctx.session().save(post).expect("Failed to save");
    assert_eq!(saved, post);
    assert!(ctx.take_operations().is_empty());
}

#[test]
fn test_insert_fresh_document() {
    let mut ctx = TestContext::new();
    let session = ctx.session();
    let post = session.create("posts").unwrap();
    session.set(post, "name", "a").unwrap();

    session.save(post).expect("Failed to insert");

    assert!(!session.is_modified(post).unwrap());
    let id = session.id(post).unwrap().expect("identity assigned on insert");
    assert_field(session, post, "_type", json!("document"));

    let operations = ctx.take_operations();
    match &operations[..] {
        [Operation::Insert { collection, document }] => {
            assert_eq!(collection, "posts");
            assert_eq!(document["_id"], id);
            assert_eq!(document["name"], json!("a"));
            assert_eq!(document["_type"], json!("document"));
        }
        other => panic!("expected one insert, got {other:?}"),
    }
}

#[test]
fn test_in_place_set_append_is_written() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "tags": ["x", "y"]}));
    let session = ctx.session();
    let tags = set_field(session, post, "tags");

    session.append(tags, "z").unwrap();
    session.save(post).expect("Failed to save");

    let operations = ctx.take_operations();
    let update = single_update(&operations);
    assert_eq!(update.to_value(), json!({"$set": {"tags": ["x", "y", "z"]}}));

    // The set is clean afterwards and a second save is a no-op
    let session = ctx.session();
    assert!(!session.is_modified(tags).unwrap());
    session.save(post).unwrap();
    assert!(ctx.take_operations().is_empty());
}

#[test]
fn test_embedded_entity_change_is_written() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "author": {"name": "ann", "age": 30}}));
    let session = ctx.session();
    let author = entity_field(session, post, "author");

    session.set(author, "name", "bob").unwrap();
    let saved = session.save(author).expect("Failed to save");
    assert_eq!(saved, post);

    let operations = ctx.take_operations();
    let update = single_update(&operations);
    assert_eq!(
        update.to_value(),
        json!({"$set": {"author": {"name": "bob", "age": 30}}})
    );
    assert!(!ctx.session().has_changes(post).unwrap());
}

#[test]
fn test_update_diff_shape() {
    let mut ctx = TestContext::new();
    let post = ctx.load("posts", json!({"_id": 1, "a": 1, "b": 2, "tags": ["x"]}));
    let session = ctx.session();

    session.set(post, "a", 10).unwrap();
    session.unset(post, "b").unwrap();
    session.set(post, "meta", json!({"k": [1, 2]})).unwrap();
    session.save(post).unwrap();

    let operations = ctx.take_operations();
    match &operations[..] {
        [Operation::Update { collection, filter, command }] => {
            assert_eq!(collection, "posts");
            assert_eq!(Value::Object(filter.clone()), json!({"_id": 1}));
            assert_eq!(
                command.to_value(),
                json!({"$set": {"a": 10, "meta": {"k": [1, 2]}}, "$unset": {"b": 1}})
            );
        }
        other => panic!("expected one update, got {other:?}"),
    }
}

#[test]
fn test_embedded_save_delegates_to_new_root() {
    let mut ctx = TestContext::new();
    let session = ctx.session();
    let post = session.create("posts").unwrap();
    session.set(post, "comments", json!([{"text": "first"}])).unwrap();
    let comments = set_field(session, post, "comments");
    let comment = session
        .element(comments, 0)
        .unwrap()
        .and_then(|slot| slot.as_entity())
        .unwrap();

    let saved = session.save(comment).expect("Failed to save");
    assert_eq!(saved, post);
    assert!(session.id(post).unwrap().is_some());
    assert!(session.id(comment).unwrap().is_none());

    let operations = ctx.take_operations();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].collection(), "posts");
    assert!(matches!(operations[0], Operation::Insert { .. }));
}

#[test]
fn test_saving_reference_fails() {
    let mut ctx = TestContext::new();
    let user = ctx.stored("users", json!({"name": "ann"}));
    let reference = ctx.session().reference(user).unwrap();
    let post = ctx.stored("posts", json!({"author": reference.to_value()}));

    let session = ctx.session();
    let author = entity_field(session, post, "author");
    let err = session.save(author).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::CannotSaveReference { .. })
    ));
    assert!(err.is_reference_error());
}

#[test]
fn test_set_rooted_graph_cannot_be_saved() {
    let mut ctx = TestContext::new();
    let session = ctx.session();
    let set = session.create_set().unwrap();
    session.append(set, json!({"name": "orphan"})).unwrap();
    let orphan = session
        .element(set, 0)
        .unwrap()
        .and_then(|slot| slot.as_entity())
        .unwrap();

    let err = session.save(orphan).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::InvalidDocumentSet { .. })
    ));
    assert!(ctx.take_operations().is_empty());
}

#[test]
fn test_failed_insert_keeps_pending_state() {
    let mut ctx = TestContext::new();
    ctx.stored("posts", json!({"_id": "taken"}));

    let session = ctx.session();
    let post = session.create("posts").unwrap();
    session.set(post, "_id", "taken").unwrap();
    session.set(post, "title", "a").unwrap();

    let err = session.save(post).unwrap_err();
    assert!(err.is_store_error());
    assert!(session.is_modified(post).unwrap());
    assert_eq!(session.changed_fields(post).unwrap(), vec!["_id", "title"]);

    // The other assignments survive the failed attempt
    session.set(post, "_id", "free").unwrap();
    session.save(post).expect("Failed to save after retry");
    assert_eq!(session.id(post).unwrap(), Some(json!("free")));
}

#[test]
fn test_failed_update_keeps_pending_state() {
    let store = Arc::new(RefusingUpdates::new());
    let mut session = Session::new(store.clone());
    let post = session.create("posts").unwrap();
    session.set(post, "title", "a").unwrap();
    session.set(post, "draft", true).unwrap();
    session.save(post).expect("Failed to insert document");

    session.set(post, "title", "b").unwrap();
    session.unset(post, "draft").unwrap();
    let pending = session.preview_update(post).unwrap();
    store.inner().clear_operations();

    store.refuse_updates(true);
    let err = session.save(post).unwrap_err();
    assert!(err.is_store_error());
    assert!(session.is_modified(post).unwrap());
    assert_eq!(session.changed_fields(post).unwrap(), vec!["draft", "title"]);
    assert_eq!(session.preview_update(post).unwrap(), pending);
    assert!(store.inner().operations().is_empty());

    // The retry sends the command the failed attempt would have sent
    store.refuse_updates(false);
    session.save(post).expect("Failed to save after retry");
    let operations = store.inner().operations();
    assert_eq!(Some(single_update(&operations).clone()), pending);
    assert!(!session.is_modified(post).unwrap());
}

#[test]
fn test_save_inside_resolved_reference_is_refused() {
    let mut ctx = TestContext::new();
    let user = ctx.stored("users", json!({"_id": "u1", "address": {"city": "Rome"}}));
    let reference = ctx.session().reference(user).unwrap();
    let post = ctx.load("posts", json!({"_id": 1, "author": reference.to_value()}));

    let session = ctx.session();
    let author = entity_field(session, post, "author");
    let address = entity_field(session, author, "address");
    session.set(address, "city", "Milan").unwrap();

    let err = session.save(address).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::CannotSaveReference { .. })
    ));
    assert!(session.preview_update(address).is_err());
    assert!(session.has_changes(address).unwrap());
    assert!(ctx.take_operations().is_empty());
}

#[test]
fn test_lifecycle_events_fire_in_order() {
    let mut ctx = TestContext::new();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let session = ctx.session();
    let post = session.create("posts").unwrap();

    for name in [PRE_SAVE, PRE_INSERT, PRE_UPDATE, POST_SAVE, POST_INSERT, POST_UPDATE] {
        let fired = fired.clone();
        session.events_mut(post).unwrap().on(name, move |_, _| {
            fired.lock().unwrap().push(name);
            Ok(())
        });
    }

    session.set(post, "title", "a").unwrap();
    session.save(post).unwrap();
    session.set(post, "title", "b").unwrap();
    session.save(post).unwrap();

    assert_eq!(
        *fired.lock().unwrap(),
        vec![
            PRE_SAVE,
            PRE_INSERT,
            POST_SAVE,
            POST_INSERT,
            PRE_SAVE,
            PRE_UPDATE,
            POST_SAVE,
            POST_UPDATE
        ]
    );
}

#[test]
fn test_pre_save_mutation_is_persisted() {
    let mut ctx = TestContext::new();
    let session = ctx.session();
    let post = session.create("posts").unwrap();
    session.events_mut(post).unwrap().on(PRE_SAVE, |session, entity| {
        session.set(entity, "revision", 1)
    });

    session.set(post, "title", "a").unwrap();
    session.save(post).unwrap();

    let operations = ctx.take_operations();
    assert!(matches!(
        &operations[..],
        [Operation::Insert { document, .. }] if document["revision"] == json!(1)
    ));
}

#[test]
fn test_remove_document() {
    let mut ctx = TestContext::new();
    let post = ctx.stored("posts", json!({"title": "a"}));
    let session = ctx.session();

    session.remove(post).expect("Failed to remove");
    assert_eq!(ctx.store().count("posts").unwrap(), 0);

    let session = ctx.session();
    let fresh = session.create("posts").unwrap();
    let err = session.remove(fresh).unwrap_err();
    assert!(matches!(
        err,
        docmap::Error::Document(DocumentError::MissingIdentity { .. })
    ));
}
