//! User endpoints.

use axum::{Json, Router, extract::State, routing::post};
use chrono::{DateTime, Utc};
use quill_common::{AppError, AppResult};
use quill_core::ActivitySummary;
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Activity summary request. Defaults to the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummaryRequest {
    pub user_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Audit actions grouped by kind. Admins may query any user.
async fn activity_summary(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    body: Option<Json<ActivitySummaryRequest>>,
) -> AppResult<ApiResponse<ActivitySummary>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let target = req.user_id.unwrap_or_else(|| user.id.clone());
    if target != user.id && !user.is_admin {
        return Err(AppError::Unauthorized(
            "Cannot view another user's activity".to_string(),
        ));
    }

    let summary = state
        .analytics_service
        .user_activity_summary(&target, req.start, req.end)
        .await?;
    Ok(ApiResponse::ok(summary))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/activity-summary", post(activity_summary))
}
