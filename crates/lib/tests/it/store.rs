//! Sessions over configured stores: file persistence, queries and removal.

use std::sync::Arc;

use docmap::{
    InMemoryStore, Session,
    connection::{self, ConnectionConfig},
    store::Filter,
};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_documents_survive_reopening_file_store() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("blog.json");
    let uri = url::Url::from_file_path(&path).expect("Failed to build file URI");
    let config = ConnectionConfig::parse(uri.as_str()).expect("Failed to parse URI");

    let id = {
        let mut session = Session::new(connection::open(&config).expect("Failed to open store"));
        let post = session.create("posts").unwrap();
        session.set(post, "title", "persisted").unwrap();
        session.set(post, "tags", json!(["a"])).unwrap();
        session.save(post).unwrap();

        let tags = set_field(&mut session, post, "tags");
        session.append(tags, "b").unwrap();
        session.save(post).unwrap();
        session.id(post).unwrap().expect("identity assigned on insert")
    };

    let mut session = Session::new(connection::open(&config).expect("Failed to reopen store"));
    let post = session
        .find_by_id("posts", id)
        .unwrap()
        .expect("Failed to find persisted post");
    assert_field(&mut session, post, "title", json!("persisted"));
    assert_field(&mut session, post, "tags", json!(["a", "b"]));
    assert!(!session.is_modified(post).unwrap());
}

#[test]
fn test_find_with_filters() {
    let mut ctx = TestContext::new();
    for (title, kind) in [("a", "news"), ("b", "blog"), ("c", "news")] {
        ctx.stored("posts", json!({"title": title, "kind": kind, "tags": [kind]}));
    }

    let session = ctx.session();
    let mut filter = Filter::new();
    filter.insert("kind".to_string(), json!("news"));
    let news = session.find("posts", &filter).unwrap();
    let titles: Vec<_> = news
        .iter()
        .map(|post| session.get_json(*post, "title").unwrap())
        .collect();
    assert_eq!(titles, vec![Some(json!("a")), Some(json!("c"))]);

    let mut by_tag = Filter::new();
    by_tag.insert("tags".to_string(), json!("blog"));
    let blog = session.find_one("posts", &by_tag).unwrap().unwrap();
    assert_field(session, blog, "title", json!("b"));

    assert!(session.find_by_id("posts", "missing").unwrap().is_none());
}

#[test]
fn test_remove_where() {
    let mut ctx = TestContext::new();
    ctx.stored("posts", json!({"kind": "draft"}));
    ctx.stored("posts", json!({"kind": "draft"}));
    ctx.stored("posts", json!({"kind": "final"}));

    let mut filter = Filter::new();
    filter.insert("kind".to_string(), json!("draft"));
    ctx.session().remove_where("posts", &filter).unwrap();

    assert_eq!(ctx.store().count("posts").unwrap(), 1);
    assert_eq!(ctx.take_operations().len(), 1);
}

#[test]
fn test_memory_backend_carries_database_name() {
    let config = ConnectionConfig::parse("memory:/blog").unwrap();
    assert_eq!(config.default_db.as_deref(), Some("blog"));

    let mut session = Session::new(connection::open(&config).unwrap());
    let user = session.create("users").unwrap();
    session.save(user).unwrap();
    let reference = session.reference(user).unwrap();

    assert!(session.dereference(&reference.clone().with_database("blog")).is_ok());
    let err = session
        .dereference(&reference.with_database("archive"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_sessions_share_a_store() {
    let store = Arc::new(InMemoryStore::new());
    let mut writer = Session::new(store.clone());
    let mut reader = Session::new(store);

    let post = writer.create("posts").unwrap();
    writer.set(post, "title", "shared").unwrap();
    writer.save(post).unwrap();
    let id = writer.id(post).unwrap().unwrap();

    let copy = reader.find_by_id("posts", id).unwrap().unwrap();
    assert_field(&mut reader, copy, "title", json!("shared"));
}
