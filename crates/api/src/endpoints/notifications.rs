//! Notifications endpoints.

use axum::{Json, Router, extract::State, routing::post};
use quill_common::AppResult;
use quill_core::{NotificationPreferences, NotificationPreferencesUpdate, NotificationView};
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// List notifications request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsRequest {
    /// Maximum results (default: 10, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Cursor for pagination (before this ID)
    pub until_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

const fn default_limit() -> u64 {
    10
}

/// Request naming one notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIdRequest {
    pub notification_id: String,
}

/// Count response.
#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// List the caller's notifications, newest first.
async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    body: Option<Json<ListNotificationsRequest>>,
) -> AppResult<ApiResponse<Vec<NotificationView>>> {
    let req = body.map_or(
        ListNotificationsRequest {
            limit: default_limit(),
            until_id: None,
            unread_only: false,
        },
        |Json(req)| req,
    );
    let notifications = state
        .notification_service
        .list(&user.id, req.limit, req.until_id.as_deref(), req.unread_only)
        .await?;
    Ok(ApiResponse::ok(notifications))
}

/// Mark one notification as read.
async fn mark_as_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<NotificationIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .notification_service
        .mark_as_read(&user.id, &req.notification_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Mark every notification as read.
async fn mark_all_as_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_as_read(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Number of unread notifications.
async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Delete one notification.
async fn delete_notification(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<NotificationIdRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .notification_service
        .delete(&user.id, &req.notification_id)
        .await?;
    Ok(ApiResponse::ok(()))
}

/// Delete every notification.
async fn delete_all_notifications(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.delete_all(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Read the caller's channel preferences.
async fn get_preferences(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<NotificationPreferences>> {
    let prefs = state.notification_service.get_preferences(&user.id).await?;
    Ok(ApiResponse::ok(prefs))
}

/// Partially update the caller's channel preferences.
async fn update_preferences(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(update): Json<NotificationPreferencesUpdate>,
) -> AppResult<ApiResponse<NotificationPreferences>> {
    let prefs = state
        .notification_service
        .update_preferences(&user.id, update)
        .await?;
    Ok(ApiResponse::ok(prefs))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(list))
        .route("/mark-as-read", post(mark_as_read))
        .route("/mark-all-as-read", post(mark_all_as_read))
        .route("/unread-count", post(unread_count))
        .route("/delete", post(delete_notification))
        .route("/delete-all", post(delete_all_notifications))
        .route("/preferences", post(get_preferences))
        .route("/preferences/update", post(update_preferences))
}
