//! Admin maintenance endpoints.

use axum::{Json, Router, extract::State, routing::post};
use quill_common::AppResult;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{extractors::AdminUser, middleware::AppState, response::ApiResponse};

/// Cleanup request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default = "default_days_old")]
    pub days_old: i64,
}

const fn default_days_old() -> i64 {
    90
}

/// Cleanup response.
#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

/// Delete old view records.
async fn cleanup_views(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>,
) -> AppResult<ApiResponse<CleanupResponse>> {
    info!(admin_id = %admin.id, days_old = req.days_old, "Admin view cleanup");
    let deleted = state
        .analytics_service
        .cleanup_old_views(req.days_old)
        .await?;
    Ok(ApiResponse::ok(CleanupResponse { deleted }))
}

/// Delete old audit records.
async fn cleanup_activity(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>,
) -> AppResult<ApiResponse<CleanupResponse>> {
    info!(admin_id = %admin.id, days_old = req.days_old, "Admin activity cleanup");
    let deleted = state
        .analytics_service
        .cleanup_old_activity(req.days_old)
        .await?;
    Ok(ApiResponse::ok(CleanupResponse { deleted }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cleanup-views", post(cleanup_views))
        .route("/cleanup-activity", post(cleanup_activity))
}
