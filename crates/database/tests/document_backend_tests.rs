//! Active-record behavior on the embedded document backend.

use core_types::{BackendKind, Related};
use database::{ActiveRecord, DataSource, DbError};
use models::{Post, Role, User};
use uuid::Uuid;

fn store() -> DataSource {
    DataSource::open_temporary().expect("temporary document store")
}

#[tokio::test]
async fn temporary_source_is_a_document_backend() {
    assert_eq!(store().backend(), BackendKind::Document);
}

#[tokio::test]
async fn save_on_transient_record_inserts_and_assigns_id() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");

    user.save(&db).await.unwrap();

    let id = user.meta.id.expect("id assigned on insert");
    assert!(!id.is_nil());
    assert!(user.meta.created_at.is_some());
    assert_eq!(user.meta.created_at, user.meta.updated_at);

    let loaded = User::get(&db, id).await.unwrap().unwrap();
    assert_eq!(loaded, user);
}

#[tokio::test]
async fn save_on_persisted_record_updates_and_keeps_id() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");
    user.save(&db).await.unwrap();
    let id = user.meta.id;
    let created_at = user.meta.created_at;

    user.email = "ada@lovelace.org".to_string();
    user.save(&db).await.unwrap();

    assert_eq!(user.meta.id, id);
    assert_eq!(user.meta.created_at, created_at);
    assert!(user.meta.updated_at >= created_at);

    let all = User::get_all(&db).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].email, "ada@lovelace.org");
}

#[tokio::test]
async fn update_without_id_is_rejected() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");
    let err = user.update(&db).await.unwrap_err();
    assert!(matches!(err, DbError::MissingId { table: "users" }));
}

#[tokio::test]
async fn update_of_unknown_id_is_not_found() {
    let db = store();
    let mut user = User::new("Ghost", "ghost@example.com");
    user.meta.id = Some(Uuid::new_v4());
    let err = user.update(&db).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "users", .. }));
}

#[tokio::test]
async fn delete_reports_whether_a_record_existed() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");

    assert!(!user.delete(&db).await.unwrap(), "transient records delete nothing");

    user.save(&db).await.unwrap();
    assert!(user.delete(&db).await.unwrap());
    assert!(!user.delete(&db).await.unwrap());

    let id = user.meta.id.unwrap();
    assert!(User::get(&db, id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_by_id_needs_only_the_id() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");
    user.save(&db).await.unwrap();
    let id = user.meta.id.unwrap();

    assert!(User::delete_by_id(&db, id).await.unwrap());
    assert!(!User::delete_by_id(&db, id).await.unwrap());
    assert!(User::get(&db, id).await.unwrap().is_none());
}

#[tokio::test]
async fn insert_with_an_existing_id_is_a_conflict() {
    let db = store();
    let mut original = User::new("Original", "original@example.com");
    original.save(&db).await.unwrap();
    let id = original.meta.id.unwrap();

    let mut second = User::new("Second", "second@example.com");
    second.meta.id = Some(id);
    let err = second.insert(&db).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { table: "users", id: taken } if taken == id));

    let stored = User::get(&db, id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Original");
}

#[tokio::test]
async fn get_all_returns_records_in_creation_order() {
    let db = store();
    for name in ["first", "second", "third"] {
        let mut role = Role::new(name);
        role.save(&db).await.unwrap();
    }

    let names: Vec<_> = Role::get_all(&db)
        .await
        .unwrap()
        .into_iter()
        .map(|role| role.name)
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn query_ignores_the_string_and_scans_the_collection() {
    let db = store();
    let mut a = Role::new("admin");
    a.save(&db).await.unwrap();
    let mut b = Role::new("editor");
    b.save(&db).await.unwrap();

    let rows = Role::query(&db, "SELECT * FROM roles WHERE name = 'admin'").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "admin");
}

#[tokio::test]
async fn belongs_to_round_trips_and_patches_the_foreign_key() {
    let db = store();
    let mut author = User::new("Ada", "ada@example.com");
    author.save(&db).await.unwrap();
    let mut post = Post::new("Notes on the Engine", "...");
    post.save(&db).await.unwrap();

    assert_eq!(post.get_related::<User>(&db, "author").await.unwrap(), Related::One(None));

    post.set_related(&db, "author", std::slice::from_ref(&author)).await.unwrap();
    assert_eq!(post.author_id, author.meta.id);

    // A later save must not undo the association.
    post.title = "Notes on the Analytical Engine".to_string();
    post.save(&db).await.unwrap();

    let related = post.get_related::<User>(&db, "author").await.unwrap();
    assert_eq!(related.into_one().unwrap().name, "Ada");

    post.set_related::<User>(&db, "author", &[]).await.unwrap();
    assert_eq!(post.author_id, None);
    assert!(post.get_related::<User>(&db, "author").await.unwrap().is_empty());
}

#[tokio::test]
async fn has_many_replaces_the_owned_set() {
    let db = store();
    let mut author = User::new("Ada", "ada@example.com");
    author.save(&db).await.unwrap();

    let mut posts = Vec::new();
    for title in ["one", "two", "three"] {
        let mut post = Post::new(title, "");
        post.save(&db).await.unwrap();
        posts.push(post);
    }

    author.set_related(&db, "posts", &posts[..2]).await.unwrap();
    let titles: Vec<_> = author
        .get_related::<Post>(&db, "posts")
        .await
        .unwrap()
        .into_vec()
        .into_iter()
        .map(|post| post.title)
        .collect();
    assert_eq!(titles, vec!["one", "two"]);

    author.set_related(&db, "posts", &posts[2..]).await.unwrap();
    let owned = author.get_related::<Post>(&db, "posts").await.unwrap().into_vec();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].title, "three");

    let detached = Post::get(&db, posts[0].meta.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(detached.author_id, None);
}

#[tokio::test]
async fn many_to_many_links_and_relinks() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");
    user.save(&db).await.unwrap();
    let mut admin = Role::new("admin");
    admin.save(&db).await.unwrap();
    let mut editor = Role::new("editor");
    editor.save(&db).await.unwrap();

    user.set_related(&db, "roles", &[admin.clone(), editor.clone(), admin.clone()])
        .await
        .unwrap();
    let roles = user.get_related::<Role>(&db, "roles").await.unwrap();
    assert_eq!(roles.len(), 2);

    user.set_related(&db, "roles", std::slice::from_ref(&editor)).await.unwrap();
    let roles = user.get_related::<Role>(&db, "roles").await.unwrap().into_vec();
    assert_eq!(roles, vec![editor]);
}

#[tokio::test]
async fn get_related_on_missing_record_is_not_found() {
    let db = store();
    let mut user = User::new("Ghost", "ghost@example.com");
    user.meta.id = Some(Uuid::new_v4());

    let err = user.get_related::<Post>(&db, "posts").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "users", .. }));

    let err = user.set_related::<Role>(&db, "roles", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "users", .. }));
}

#[tokio::test]
async fn association_errors_are_reported_before_touching_the_store() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");

    let err = user.get_related::<Post>(&db, "posts").await.unwrap_err();
    assert!(matches!(err, DbError::MissingId { table: "users" }));

    user.save(&db).await.unwrap();

    let err = user.get_related::<Post>(&db, "comments").await.unwrap_err();
    assert!(matches!(err, DbError::UnknownRelation { table: "users", .. }));

    let err = user.get_related::<Role>(&db, "posts").await.unwrap_err();
    assert!(matches!(err, DbError::TargetMismatch { expected: "posts", actual: "roles", .. }));

    let unsaved = Role::new("ghost");
    let err = user.set_related(&db, "roles", &[unsaved]).await.unwrap_err();
    assert!(matches!(err, DbError::MissingId { table: "roles" }));
}

#[tokio::test]
async fn belongs_to_accepts_at_most_one_target() {
    let db = store();
    let mut a = User::new("A", "a@example.com");
    a.save(&db).await.unwrap();
    let mut b = User::new("B", "b@example.com");
    b.save(&db).await.unwrap();
    let mut post = Post::new("title", "body");
    post.save(&db).await.unwrap();

    let err = post.set_related(&db, "author", &[a, b]).await.unwrap_err();
    assert!(matches!(err, DbError::Cardinality { relation: "author", got: 2 }));
}

#[tokio::test]
async fn set_related_rejects_targets_that_were_never_stored() {
    let db = store();
    let mut user = User::new("Ada", "ada@example.com");
    user.save(&db).await.unwrap();

    let mut phantom = Role::new("phantom");
    phantom.meta.id = Some(Uuid::new_v4());

    let err = user.set_related(&db, "roles", &[phantom]).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "roles", .. }));
}
