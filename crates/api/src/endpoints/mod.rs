//! API endpoints.

mod admin;
mod comments;
mod following;
mod notifications;
mod posts;
mod users;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/posts", posts::router())
        .nest("/comments", comments::router())
        .nest("/following", following::router())
        .nest("/notifications", notifications::router())
        .nest("/users", users::router())
        .nest("/admin", admin::router())
        .nest("/streaming/sse", sse::router())
}
