//! WebSocket streaming API.
//!
//! Every connection joins its user's room and may subscribe to post rooms.
//! Frames are `{"type": "<event>", "body": {...}}`.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use quill_common::{AppError, AppResult};
use quill_core::{EventPublisher, Room, StreamEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio_stream::{StreamMap, wrappers::BroadcastStream};
use tracing::{debug, error, info, warn};

use crate::middleware::AppState;

/// Buffered frames per room before slow receivers lag.
const ROOM_CAPACITY: usize = 256;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Access token for authentication.
    #[serde(rename = "i")]
    pub token: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start receiving a post's comment events.
    #[serde(rename_all = "camelCase")]
    SubscribePost { post_id: String },
    /// Stop receiving a post's comment events.
    #[serde(rename_all = "camelCase")]
    UnsubscribePost { post_id: String },
}

/// Server-to-client acknowledgement.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage {
    Subscribed { room: String },
    Unsubscribed { room: String },
}

/// In-process pub/sub keyed by room.
///
/// Rooms are created on first subscribe and removed by [`StreamingHub::sweep`]
/// once nobody listens.
#[derive(Clone, Default)]
pub struct StreamingHub {
    rooms: Arc<RwLock<HashMap<Room, broadcast::Sender<Arc<str>>>>>,
}

impl StreamingHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating it if needed.
    pub async fn subscribe(&self, room: Room) -> broadcast::Receiver<Arc<str>> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Remove rooms without receivers. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, sender| sender.receiver_count() > 0);
        before - rooms.len()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[async_trait]
impl EventPublisher for StreamingHub {
    async fn publish(&self, room: Room, event: StreamEvent) -> AppResult<()> {
        let rooms = self.rooms.read().await;
        let Some(sender) = rooms.get(&room) else {
            debug!(room = %room, event = event.name(), "No listeners");
            return Ok(());
        };

        let frame = serde_json::to_string(&event)
            .map_err(|e| AppError::Internal(format!("Failed to encode event: {e}")))?;
        // A send error only means every receiver already left.
        let delivered = sender.send(Arc::from(frame)).unwrap_or(0);
        debug!(room = %room, event = event.name(), delivered, "Event published");
        Ok(())
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let user_id = match query.token.as_deref() {
        Some(token) => Some(
            state
                .user_repo
                .find_by_token(token)
                .await?
                .ok_or(AppError::Unauthenticated)?
                .id,
        ),
        None => None,
    };

    info!(user_id = ?user_id, "New streaming connection");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, user_id: Option<String>, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rooms: StreamMap<Room, BroadcastStream<Arc<str>>> = StreamMap::new();

    if let Some(ref id) = user_id {
        let room = Room::User(id.clone());
        let rx = state.hub.subscribe(room.clone()).await;
        rooms.insert(room, BroadcastStream::new(rx));
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_client_message(client_msg, &mut rooms, &state).await,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse client message");
                                continue;
                            }
                        };
                        let json = serde_json::to_string(&reply).unwrap_or_default();
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client closed connection");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            Some((room, frame)) = rooms.next(), if !rooms.is_empty() => {
                match frame {
                    Ok(frame) => {
                        if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(room = %room, error = %e, "Streaming receiver lagged"),
                }
            }
        }
    }

    info!(user_id = ?user_id, "Streaming connection closed");
}

/// Handle a client message.
async fn handle_client_message(
    msg: ClientMessage,
    rooms: &mut StreamMap<Room, BroadcastStream<Arc<str>>>,
    state: &AppState,
) -> ServerMessage {
    match msg {
        ClientMessage::SubscribePost { post_id } => {
            let room = Room::Post(post_id);
            if !rooms.contains_key(&room) {
                let rx = state.hub.subscribe(room.clone()).await;
                rooms.insert(room.clone(), BroadcastStream::new(rx));
            }
            info!(room = %room, "Subscribed");
            ServerMessage::Subscribed {
                room: room.to_string(),
            }
        }
        ClientMessage::UnsubscribePost { post_id } => {
            let room = Room::Post(post_id);
            rooms.remove(&room);
            info!(room = %room, "Unsubscribed");
            ServerMessage::Unsubscribed {
                room: room.to_string(),
            }
        }
    }
}
