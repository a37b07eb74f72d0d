//! Active-record behavior on PostgreSQL.
//!
//! These tests need a disposable database. Point `DATABASE_URL` at it and run
//! `cargo test -p database -- --ignored`.

use core_types::{BackendKind, Related};
use database::{ActiveRecord, DataSource, DbError, run_migrations};
use models::{Post, Role, User};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn postgres() -> DataSource {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for relational tests");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    run_migrations(&pool).await.expect("apply migrations");
    DataSource::from(pool)
}

fn unique_email() -> String {
    format!("{}@example.com", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn save_inserts_then_updates_in_place() {
    let db = postgres().await;
    assert_eq!(db.backend(), BackendKind::Relational);

    let mut user = User::new("Ada", unique_email());
    user.save(&db).await.unwrap();
    let id = user.meta.id.expect("database generated an id");

    user.name = "Ada Lovelace".to_string();
    user.save(&db).await.unwrap();
    assert_eq!(user.meta.id, Some(id));

    let loaded = User::get(&db, id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Ada Lovelace");
    assert_eq!(loaded.email, user.email);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn delete_reports_affected_rows() {
    let db = postgres().await;
    let mut user = User::new("Temp", unique_email());
    user.save(&db).await.unwrap();

    assert!(user.delete(&db).await.unwrap());
    assert!(!user.delete(&db).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn raw_query_returns_rows_as_json() {
    let db = postgres().await;
    let email = unique_email();
    let mut user = User::new("Queried", email.clone());
    user.save(&db).await.unwrap();

    let rows = User::query(&db, &format!("SELECT name, email FROM users WHERE email = '{email}';"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Queried");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn raw_query_accepts_comments_and_data_changes() {
    let db = postgres().await;
    let email = unique_email();
    let mut user = User::new("Before", email.clone());
    user.save(&db).await.unwrap();

    let rows = User::query(&db, &format!("SELECT name FROM users WHERE email = '{email}' -- by email"))
        .await
        .unwrap();
    assert_eq!(rows[0]["name"], "Before");

    let rows = User::query(&db, &format!("UPDATE users SET name = 'After' WHERE email = '{email}'"))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = User::query(&db, &format!("DELETE FROM users WHERE email = '{email}' RETURNING name"))
        .await
        .unwrap();
    assert_eq!(rows[0]["name"], "After");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn insert_with_an_existing_id_is_a_conflict() {
    let db = postgres().await;
    let mut original = User::new("Original", unique_email());
    original.save(&db).await.unwrap();
    let id = original.meta.id.unwrap();

    let mut second = User::new("Second", unique_email());
    second.meta.id = Some(id);
    let err = second.insert(&db).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { table: "users", id: taken } if taken == id));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn associations_match_the_document_backend() {
    let db = postgres().await;
    let mut author = User::new("Ada", unique_email());
    author.save(&db).await.unwrap();
    let mut post = Post::new("Notes", "body");
    post.save(&db).await.unwrap();
    let mut admin = Role::new("admin");
    admin.save(&db).await.unwrap();

    post.set_related(&db, "author", std::slice::from_ref(&author)).await.unwrap();
    assert_eq!(post.author_id, author.meta.id);
    let owner = post.get_related::<User>(&db, "author").await.unwrap();
    assert_eq!(owner.into_one().map(|u| u.meta.id), Some(author.meta.id));

    let posts = author.get_related::<Post>(&db, "posts").await.unwrap();
    assert_eq!(posts.len(), 1);

    author.set_related(&db, "roles", std::slice::from_ref(&admin)).await.unwrap();
    let roles = author.get_related::<Role>(&db, "roles").await.unwrap().into_vec();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "admin");

    author.set_related::<Role>(&db, "roles", &[]).await.unwrap();
    assert_eq!(
        author.get_related::<Role>(&db, "roles").await.unwrap(),
        Related::Many(Vec::new())
    );
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
async fn get_related_on_missing_record_is_not_found() {
    let db = postgres().await;
    let mut ghost = User::new("Ghost", unique_email());
    ghost.meta.id = Some(Uuid::new_v4());

    let err = ghost.get_related::<Post>(&db, "posts").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "users", .. }));

    let mut orphan = Post::new("Orphan", "");
    orphan.meta.id = Some(Uuid::new_v4());
    let err = orphan.get_related::<User>(&db, "author").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { table: "posts", .. }));
}
