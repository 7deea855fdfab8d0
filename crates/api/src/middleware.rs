//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use quill_core::{
    AnalyticsService, CommentService, FollowingService, InteractionService, NotificationService,
};
use quill_db::repositories::{PostRepository, UserRepository};
use tracing::debug;

use crate::streaming::StreamingHub;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_repo: UserRepository,
    pub post_repo: PostRepository,
    pub interaction_service: InteractionService,
    pub comment_service: CommentService,
    pub following_service: FollowingService,
    pub notification_service: NotificationService,
    pub analytics_service: AnalyticsService,
    pub hub: StreamingHub,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` into a user extension. Requests
/// without a valid token pass through anonymously; handlers decide.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_owned);

    if let Some(token) = token {
        match state.user_repo.find_by_token(&token).await {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => debug!("Unknown bearer token"),
            Err(e) => debug!(error = %e, "Token lookup failed"),
        }
    }

    next.run(req).await
}
