//! HTTP API layer for quill.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: toggles, comments, following, notifications, analytics
//! - **Extractors**: authentication, client address
//! - **Middleware**: bearer token resolution
//! - **Streaming**: WebSocket and Server-Sent Events over one room hub
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;
pub mod streaming;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub use endpoints::router;
pub use streaming::{StreamingHub, streaming_handler};

use crate::middleware::{AppState, auth_middleware};

/// Assemble the full application: `/streaming`, `/api/*`, auth and tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
