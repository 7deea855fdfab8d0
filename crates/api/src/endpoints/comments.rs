//! Comment endpoints.

use axum::{Json, Router, extract::State, routing::post};
use quill_common::AppResult;
use quill_core::{CommentView, ToggleResult};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create comment request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: String,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// Reply request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    pub post_id: String,
    pub parent_id: String,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// Update comment request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub comment_id: String,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// Request naming one comment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentIdRequest {
    pub comment_id: String,
}

/// Thread request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRequest {
    pub post_id: String,
}

/// Delete response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCommentResponse {
    /// The deleted comment first, then its descendants.
    pub deleted_ids: Vec<String>,
}

/// Add a top-level comment to a post.
async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<ApiResponse<CommentView>> {
    req.validate()?;
    let comment = state
        .comment_service
        .create(&req.post_id, None, &user.id, &req.content)
        .await?;
    Ok(ApiResponse::ok(comment))
}

/// Reply to a comment.
async fn reply(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ReplyRequest>,
) -> AppResult<ApiResponse<CommentView>> {
    req.validate()?;
    let comment = state
        .comment_service
        .create(&req.post_id, Some(req.parent_id.as_str()), &user.id, &req.content)
        .await?;
    Ok(ApiResponse::ok(comment))
}

/// Edit a comment's content.
async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UpdateCommentRequest>,
) -> AppResult<ApiResponse<CommentView>> {
    req.validate()?;
    let comment = state
        .comment_service
        .edit(&req.comment_id, &user.id, &req.content)
        .await?;
    Ok(ApiResponse::ok(comment))
}

/// Delete a comment and all its replies.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CommentIdRequest>,
) -> AppResult<ApiResponse<DeleteCommentResponse>> {
    let deleted_ids = state
        .comment_service
        .delete(&req.comment_id, &user.id)
        .await?;
    Ok(ApiResponse::ok(DeleteCommentResponse { deleted_ids }))
}

/// Toggle a like on a comment.
async fn like(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CommentIdRequest>,
) -> AppResult<ApiResponse<ToggleResult>> {
    let result = state
        .interaction_service
        .toggle_comment_like(&user.id, &req.comment_id)
        .await?;
    Ok(ApiResponse::ok(result))
}

/// A post's comments as a nested tree.
async fn thread(
    State(state): State<AppState>,
    Json(req): Json<ThreadRequest>,
) -> AppResult<ApiResponse<Vec<CommentView>>> {
    let tree = state.comment_service.thread(&req.post_id).await?;
    Ok(ApiResponse::ok(tree))
}

/// A single comment without replies.
async fn show(
    State(state): State<AppState>,
    Json(req): Json<CommentIdRequest>,
) -> AppResult<ApiResponse<CommentView>> {
    let comment = state.comment_service.get(&req.comment_id).await?;
    Ok(ApiResponse::ok(comment))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/reply", post(reply))
        .route("/update", post(update))
        .route("/delete", post(delete))
        .route("/like", post(like))
        .route("/thread", post(thread))
        .route("/show", post(show))
}
