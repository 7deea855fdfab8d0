//! Database integration tests against an in-memory `SQLite` database.
//!
//! Run with: `cargo test -p quill-db --features test-utils`

#![cfg(feature = "test-utils")]
#![allow(clippy::unwrap_used)]

use chrono::Utc;
use quill_common::AppError;
use quill_db::{
    entities::interaction::{self, InteractionKind, SubjectType},
    repositories::{
        CommentRepository, InteractionRepository, NotificationPreferenceRepository,
        PostRepository,
    },
    test_utils::TestDatabase,
};
use sea_orm::{ActiveModelTrait, Set};

fn like(id: &str, post_id: &str, actor_id: &str) -> interaction::ActiveModel {
    let now = Utc::now();
    interaction::ActiveModel {
        id: Set(id.to_string()),
        subject_id: Set(post_id.to_string()),
        subject_type: Set(SubjectType::Post),
        actor_id: Set(actor_id.to_string()),
        kind: Set(InteractionKind::Like),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
}

#[tokio::test]
async fn test_insert_if_absent_keeps_one_record_per_triple() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    let conn = db.connection();

    let first = InteractionRepository::insert_if_absent_in(conn.as_ref(), like("i1", "post1", "alice"))
        .await
        .unwrap();
    let second =
        InteractionRepository::insert_if_absent_in(conn.as_ref(), like("i2", "post1", "alice"))
            .await
            .unwrap();

    assert!(first);
    assert!(!second);

    let repo = InteractionRepository::new(conn);
    assert_eq!(
        repo.count_records("post1", "alice", InteractionKind::Like).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_plain_insert_of_duplicate_is_conflict() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    let conn = db.connection();

    like("i1", "post1", "alice").insert(conn.as_ref()).await.unwrap();
    let err = like("i2", "post1", "alice")
        .insert(conn.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    ));
}

#[tokio::test]
async fn test_counter_decrement_never_goes_negative() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    let conn = db.connection();

    let rows = PostRepository::step_interaction_count_in(
        conn.as_ref(),
        "post1",
        InteractionKind::Like,
        false,
    )
    .await
    .unwrap();
    assert_eq!(rows, 1);

    let post = PostRepository::new(conn).get_by_id("post1").await.unwrap();
    assert_eq!(post.likes_count, 0);
}

#[tokio::test]
async fn test_step_on_missing_post_changes_nothing() {
    let db = TestDatabase::in_memory().await.unwrap();
    let conn = db.connection();

    let rows = PostRepository::step_comments_count_in(conn.as_ref(), "ghost", true)
        .await
        .unwrap();

    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_child_ids_follow_parent_links() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    db.insert_comment("c", "post1", "alice", None).await.unwrap();
    db.insert_comment("r1", "post1", "alice", Some("c")).await.unwrap();
    db.insert_comment("r2", "post1", "alice", Some("c")).await.unwrap();
    db.insert_comment("r3", "post1", "alice", Some("r1")).await.unwrap();
    let conn = db.connection();

    let mut level1 = CommentRepository::find_child_ids_in(conn.as_ref(), &["c".to_string()])
        .await
        .unwrap();
    level1.sort();
    assert_eq!(level1, vec!["r1".to_string(), "r2".to_string()]);

    let level2 = CommentRepository::find_child_ids_in(conn.as_ref(), &level1)
        .await
        .unwrap();
    assert_eq!(level2, vec!["r3".to_string()]);
}

#[tokio::test]
async fn test_deleting_parent_takes_unseen_replies_along() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    db.insert_comment("c", "post1", "alice", None).await.unwrap();
    db.insert_comment("r1", "post1", "alice", Some("c")).await.unwrap();
    db.insert_comment("r3", "post1", "alice", Some("r1")).await.unwrap();
    let conn = db.connection();

    // Only the root was collected; its replies arrived afterwards.
    let deleted = CommentRepository::delete_many_in(conn.as_ref(), &["c".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let repo = CommentRepository::new(conn);
    assert!(repo.find_by_id("r1").await.unwrap().is_none());
    assert!(repo.find_by_id("r3").await.unwrap().is_none());
    assert!(repo.find_by_post("post1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_to_missing_parent_is_rejected() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();

    assert!(
        db.insert_comment("r1", "post1", "alice", Some("ghost"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_lock_finds_existing_comment_only() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();
    db.insert_post("post1", "alice").await.unwrap();
    db.insert_comment("c", "post1", "alice", None).await.unwrap();
    let repo = CommentRepository::new(db.connection());

    let txn = repo.begin().await.unwrap();
    let locked = CommentRepository::lock_in(&txn, "c").await.unwrap();
    assert_eq!(locked.map(|c| c.id).as_deref(), Some("c"));
    assert!(CommentRepository::lock_in(&txn, "ghost").await.unwrap().is_none());
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn test_preferences_created_lazily_once() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();

    let repo = NotificationPreferenceRepository::new(db.connection());
    assert!(repo.find("alice").await.unwrap().is_none());

    let created = repo.get_or_create("alice").await.unwrap();
    let again = repo.get_or_create("alice").await.unwrap();

    assert!(created.likes_in_app);
    assert!(!created.likes_email);
    assert_eq!(created, again);
}

#[tokio::test]
async fn test_app_error_from_duplicate_user() {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_user("alice").await.unwrap();

    let err = quill_db::repositories::UserRepository::new(db.connection())
        .create(quill_db::entities::user::ActiveModel {
            id: Set("alice2".to_string()),
            username: Set("alice".to_string()),
            username_lower: Set("alice".to_string()),
            name: Set(None),
            avatar_url: Set(None),
            email: Set(None),
            locale: Set("en".to_string()),
            token: Set(None),
            is_admin: Set(false),
            followers_count: Set(0),
            following_count: Set(0),
            liked_posts_count: Set(0),
            bookmarks_count: Set(0),
            created_at: Set(Utc::now().into()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
}
