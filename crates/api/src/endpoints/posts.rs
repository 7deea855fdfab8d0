//! Post interaction and analytics endpoints.

use std::collections::HashMap;

use axum::{Json, Router, extract::State, routing::post};
use chrono::{DateTime, Utc};
use quill_common::{AppError, AppResult};
use quill_core::{DailyAnalytics, PostAnalytics, ToggleResult, Viewer};
use quill_db::{entities::user, repositories::PostCounters};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    extractors::{AdminUser, AuthUser, ClientIp, MaybeAuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Request naming one post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostIdRequest {
    #[validate(length(min = 1, max = 64))]
    pub post_id: String,
}

/// Batch status request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[validate(length(max = 100))]
    pub post_ids: Vec<String>,
}

/// Range analytics request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub post_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Daily analytics request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalyticsRequest {
    pub post_id: String,
    #[serde(default = "default_days")]
    pub days: i64,
}

const fn default_days() -> i64 {
    30
}

/// View response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub counted: bool,
}

/// Toggle a like on a post.
async fn like(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<ToggleResult>> {
    req.validate()?;
    let result = state
        .interaction_service
        .toggle_post_like(&user.id, &req.post_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Toggle a bookmark on a post.
async fn bookmark(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<ToggleResult>> {
    req.validate()?;
    let result = state
        .interaction_service
        .toggle_post_bookmark(&user.id, &req.post_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Record a share of a post.
async fn share(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<ToggleResult>> {
    req.validate()?;
    let result = state
        .interaction_service
        .record_share(&user.id, &req.post_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Record a view. Anonymous viewers are keyed by address.
async fn view(
    MaybeAuthUser(user): MaybeAuthUser,
    ClientIp(ip): ClientIp,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<ViewResponse>> {
    req.validate()?;
    let viewer = user.map_or(Viewer::Anonymous(ip), |u| Viewer::User(u.id));
    let counted = state
        .interaction_service
        .record_view(&req.post_id, &viewer)
        .await?;
    Ok(ApiResponse::ok(ViewResponse { counted }))
}

/// Which of the given posts the caller likes.
async fn like_status(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<StatusRequest>,
) -> AppResult<ApiResponse<HashMap<String, bool>>> {
    req.validate()?;
    let status = state
        .analytics_service
        .like_status(&user.id, &req.post_ids)
        .await?;
    Ok(ApiResponse::ok(status))
}

/// Which of the given posts the caller bookmarked.
async fn bookmark_status(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<StatusRequest>,
) -> AppResult<ApiResponse<HashMap<String, bool>>> {
    req.validate()?;
    let status = state
        .analytics_service
        .bookmark_status(&user.id, &req.post_ids)
        .await?;
    Ok(ApiResponse::ok(status))
}

/// Only the author or an admin may read a post's analytics.
async fn ensure_can_read_analytics(
    state: &AppState,
    user: &user::Model,
    post_id: &str,
) -> AppResult<()> {
    let post = state.post_repo.get_by_id(post_id).await?;
    if post.user_id != user.id && !user.is_admin {
        return Err(AppError::Unauthorized(
            "Only the author can view analytics".to_string(),
        ));
    }
    Ok(())
}

/// Totals for a post over a range.
async fn analytics(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<AnalyticsRequest>,
) -> AppResult<ApiResponse<PostAnalytics>> {
    ensure_can_read_analytics(&state, &user, &req.post_id).await?;
    let result = state
        .analytics_service
        .post_analytics(&req.post_id, req.start, req.end)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Per-day series for a post.
async fn daily_analytics(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<DailyAnalyticsRequest>,
) -> AppResult<ApiResponse<DailyAnalytics>> {
    ensure_can_read_analytics(&state, &user, &req.post_id).await?;
    let result = state
        .analytics_service
        .daily_analytics(&req.post_id, req.days)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// Recompute a post's counters from the interaction store.
async fn rebuild_counters(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<ApiResponse<PostCounters>> {
    req.validate()?;
    let counters = state
        .interaction_service
        .rebuild_post_counters(&req.post_id)
        .await?;
    Ok(ApiResponse::ok(counters))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/like", post(like))
        .route("/bookmark", post(bookmark))
        .route("/share", post(share))
        .route("/view", post(view))
        .route("/like-status", post(like_status))
        .route("/bookmark-status", post(bookmark_status))
        .route("/analytics", post(analytics))
        .route("/analytics/daily", post(daily_analytics))
        .route("/rebuild-counters", post(rebuild_counters))
}
