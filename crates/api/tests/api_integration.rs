//! API integration tests.
//!
//! These drive the full router against an in-memory database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use quill_api::{StreamingHub, app, middleware::AppState};
use quill_core::{
    AnalyticsService, CommentService, FollowingService, InMemoryInteractionGuard,
    InteractionService, NotificationService,
};
use quill_db::{
    repositories::{
        CommentRepository, FollowingRepository, InteractionRepository,
        NotificationPreferenceRepository, NotificationRepository, PostRepository,
        PostViewRepository, UserActivityRepository, UserRepository,
    },
    test_utils::TestDatabase,
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Build the app over a seeded database: alice (admin), bob, and bob's post1.
async fn create_test_app() -> (TestDatabase, Router) {
    let db = TestDatabase::in_memory().await.unwrap();
    db.insert_admin("alice").await.unwrap();
    db.insert_user("bob").await.unwrap();
    db.insert_post("post1", "bob").await.unwrap();

    let conn = db.connection();
    let hub = StreamingHub::new();
    let user_repo = UserRepository::new(conn.clone());
    let post_repo = PostRepository::new(conn.clone());

    let mut notification_service = NotificationService::new(
        NotificationRepository::new(conn.clone()),
        NotificationPreferenceRepository::new(conn.clone()),
        user_repo.clone(),
    );
    notification_service.set_event_publisher(Arc::new(hub.clone()));

    let mut interaction_service = InteractionService::new(
        InteractionRepository::new(conn.clone()),
        post_repo.clone(),
        CommentRepository::new(conn.clone()),
        user_repo.clone(),
        PostViewRepository::new(conn.clone()),
        Arc::new(InMemoryInteractionGuard::new()),
        notification_service.clone(),
    );
    interaction_service.set_event_publisher(Arc::new(hub.clone()));

    let mut comment_service = CommentService::new(
        CommentRepository::new(conn.clone()),
        post_repo.clone(),
        user_repo.clone(),
        notification_service.clone(),
    );
    comment_service.set_event_publisher(Arc::new(hub.clone()));

    let following_service = FollowingService::new(
        FollowingRepository::new(conn.clone()),
        user_repo.clone(),
        notification_service.clone(),
    );

    let analytics_service = AnalyticsService::new(
        post_repo.clone(),
        PostViewRepository::new(conn.clone()),
        InteractionRepository::new(conn.clone()),
        UserActivityRepository::new(conn.clone()),
        user_repo.clone(),
    );

    let state = AppState {
        user_repo,
        post_repo,
        interaction_service,
        comment_service,
        following_service,
        notification_service,
        analytics_service,
        hub,
    };
    (db, app(state))
}

async fn call(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_like_toggle_and_cooldown() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/posts/like",
        Some("token-alice"),
        json!({"postId": "post1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["action"], "like");
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["count"], 1);

    // Second toggle inside the cooldown
    let (status, body) = call(
        &app,
        "/api/posts/like",
        Some("token-alice"),
        json!({"postId": "post1"}),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_toggle_requires_authentication() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(&app, "/api/posts/like", None, json!({"postId": "post1"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let (status, _) = call(
        &app,
        "/api/posts/like",
        Some("not-a-token"),
        json!({"postId": "post1"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_like_missing_post_is_not_found() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/posts/bookmark",
        Some("token-bob"),
        json!({"postId": "missing"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "POST_NOT_FOUND");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_comment_cascade_delete() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/comments/create",
        Some("token-bob"),
        json!({"postId": "post1", "content": "top"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let root = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = call(
        &app,
        "/api/comments/reply",
        Some("token-alice"),
        json!({"postId": "post1", "parentId": root, "content": "reply"}),
    )
    .await;
    let reply = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["isReply"], true);

    // Only the author may delete
    let (status, body) = call(
        &app,
        "/api/comments/delete",
        Some("token-alice"),
        json!({"commentId": root}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body) = call(
        &app,
        "/api/comments/delete",
        Some("token-bob"),
        json!({"commentId": root}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deletedIds"], json!([root, reply]));

    let (_, body) = call(&app, "/api/comments/thread", None, json!({"postId": "post1"})).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_comment_validation() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/comments/create",
        Some("token-bob"),
        json!({"postId": "post1", "content": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_anonymous_view_counted_once() {
    let (_db, app) = create_test_app().await;

    let request = || {
        Request::builder()
            .uri("/api/posts/view")
            .method("POST")
            .header("Content-Type", "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(r#"{"postId":"post1"}"#))
            .unwrap()
    };

    for expected in [true, false] {
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["counted"], expected);
    }
}

#[tokio::test]
async fn test_follow_toggle_notifies_followee() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/following/toggle",
        Some("token-alice"),
        json!({"userId": "bob"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isFollowing"], true);
    assert_eq!(body["data"]["followersCount"], 1);

    let (_, body) = call(&app, "/api/notifications/unread-count", Some("token-bob"), json!({})).await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = call(&app, "/api/notifications", Some("token-bob"), json!({})).await;
    assert_eq!(body["data"][0]["type"], "follow");
    assert_eq!(body["data"][0]["sender"]["id"], "alice");
}

#[tokio::test]
async fn test_notification_preferences_round_trip() {
    let (_db, app) = create_test_app().await;

    let (status, body) = call(
        &app,
        "/api/notifications/preferences",
        Some("token-bob"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["likes"]["inApp"], true);

    let (_, body) = call(
        &app,
        "/api/notifications/preferences/update",
        Some("token-bob"),
        json!({"likes": {"inApp": false}}),
    )
    .await;
    assert_eq!(body["data"]["likes"]["inApp"], false);
    assert_eq!(body["data"]["follows"]["inApp"], true);
}

#[tokio::test]
async fn test_admin_endpoints_require_admin() {
    let (_db, app) = create_test_app().await;

    let (status, _) = call(
        &app,
        "/api/admin/cleanup-views",
        Some("token-bob"),
        json!({"daysOld": 90}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "/api/admin/cleanup-views",
        Some("token-alice"),
        json!({"daysOld": 10}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = call(
        &app,
        "/api/admin/cleanup-activity",
        Some("token-alice"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 0);
}

#[tokio::test]
async fn test_analytics_restricted_to_author() {
    let (db, app) = create_test_app().await;
    db.insert_user("carol").await.unwrap();

    let (status, _) = call(
        &app,
        "/api/posts/analytics",
        Some("token-carol"),
        json!({"postId": "post1"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "/api/posts/analytics",
        Some("token-bob"),
        json!({"postId": "post1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "/api/posts/analytics/daily",
        Some("token-bob"),
        json!({"postId": "post1", "days": 7}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["views"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_sse_requires_authentication() {
    let (_db, app) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/streaming/sse/user")
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let (_db, app) = create_test_app().await;

    let (status, _) = call(&app, "/api/nonexistent", None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
