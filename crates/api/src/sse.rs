//! Server-Sent Events (SSE) for real-time updates.
//!
//! Carries the same frames as the WebSocket user room.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use quill_core::Room;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::{extractors::AuthUser, middleware::AppState};

/// User-specific SSE stream (notifications, follow updates).
async fn user_stream(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub.subscribe(Room::User(user.id)).await;

    // Lagged frames are dropped
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok().map(|frame| Ok(Event::default().data(frame.as_ref()))));

    let initial = stream::once(async { Ok(Event::default().data(r#"{"type":"connected"}"#)) });

    Sse::new(initial.chain(stream)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Create the SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/user", get(user_stream))
}
