//! Following endpoints.

use axum::{Json, Router, extract::State, routing::post};
use quill_common::AppResult;
use quill_core::FollowResult;
use serde::Deserialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Follow request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub user_id: String,
}

/// Follow a user, or unfollow if already following.
async fn toggle(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> AppResult<ApiResponse<FollowResult>> {
    let result = state
        .following_service
        .toggle_follow(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/toggle", post(toggle))
}
