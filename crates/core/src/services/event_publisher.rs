//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time events to rooms.
//! The transport (WebSocket/SSE hub) lives in the API crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_common::AppResult;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::services::comment::CommentView;
use crate::services::notification::NotificationView;

/// Identical pushes inside this window are dropped.
pub const PUSH_DEDUP_WINDOW: Duration = Duration::from_millis(200);

/// Dedup cache size that triggers pruning.
const PUSH_DEDUP_PRUNE_AT: usize = 1000;

/// Entries older than this are dropped when pruning.
const PUSH_DEDUP_MAX_AGE: Duration = Duration::from_secs(5);

/// A broadcast room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Every connection of one user.
    User(String),
    /// Everyone viewing one post.
    Post(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Post(id) => write!(f, "post:{id}"),
        }
    }
}

/// A notification pushed to its recipient.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(flatten)]
    pub notification: NotificationView,
    pub timestamp: DateTime<Utc>,
}

/// A new comment or reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreatedEvent {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub comment: CommentView,
    pub timestamp: DateTime<Utc>,
}

/// A removed comment subtree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeletedEvent {
    pub post_id: String,
    pub comment_id: String,
    pub parent_id: Option<String>,
    pub deleted_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A comment like toggled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentLikeEvent {
    pub post_id: String,
    pub comment_id: String,
    pub actor_id: String,
    pub is_liked: bool,
    pub likes_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// A follow toggled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEvent {
    pub follower_id: String,
    pub followee_id: String,
    pub is_following: bool,
    pub followers_count: i32,
    pub timestamp: DateTime<Utc>,
}

/// Events pushed to connected clients.
///
/// Serialized as `{"type": "<name>", "body": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A notification was created for the room's user.
    Notification(NotificationEvent),
    /// A comment's like state changed.
    CommentLikeUpdate(CommentLikeEvent),
    /// A top-level comment was added to a post.
    NewComment(CommentCreatedEvent),
    /// A reply was added to a comment.
    NewReply(CommentCreatedEvent),
    /// A top-level comment and its replies were removed.
    CommentDeleted(CommentDeletedEvent),
    /// A reply and its replies were removed.
    ReplyDeleted(CommentDeletedEvent),
    /// A follow relationship changed.
    FollowUpdate(FollowEvent),
}

impl StreamEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::CommentLikeUpdate(_) => "commentLikeUpdate",
            Self::NewComment(_) => "newComment",
            Self::NewReply(_) => "newReply",
            Self::CommentDeleted(_) => "commentDeleted",
            Self::ReplyDeleted(_) => "replyDeleted",
            Self::FollowUpdate(_) => "followUpdate",
        }
    }

    /// Key identifying duplicate pushes of the same event.
    #[must_use]
    pub fn composite_key(&self) -> String {
        match self {
            Self::Notification(e) => {
                let n = &e.notification;
                format!(
                    "{:?}:{}:{}:{}",
                    n.notification_type,
                    n.sender.as_ref().map_or("", |s| s.id.as_str()),
                    n.related_post_id.as_deref().unwrap_or(""),
                    n.related_comment_id.as_deref().unwrap_or(""),
                )
            }
            Self::CommentLikeUpdate(e) => {
                format!("{}:{}:{}", e.comment_id, e.actor_id, e.is_liked)
            }
            Self::NewComment(e) | Self::NewReply(e) => e.comment.id.clone(),
            Self::CommentDeleted(e) | Self::ReplyDeleted(e) => e.comment_id.clone(),
            Self::FollowUpdate(e) => {
                format!("{}:{}:{}", e.follower_id, e.followee_id, e.is_following)
            }
        }
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without depending on the transport implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver an event to every subscriber of a room.
    async fn publish(&self, room: Room, event: StreamEvent) -> AppResult<()>;
}

/// Wrapper for boxed EventPublisher trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;

/// Publisher that discards everything.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _room: Room, _event: StreamEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Drops repeats of the same event to the same room inside [`PUSH_DEDUP_WINDOW`].
pub struct DedupEventPublisher {
    inner: EventPublisherService,
    recent: Mutex<HashMap<String, Instant>>,
}

impl DedupEventPublisher {
    /// Wrap a publisher.
    #[must_use]
    pub fn new(inner: EventPublisherService) -> Self {
        Self {
            inner,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Record `key`, returning `false` if it was seen inside the window.
    async fn admit(&self, key: String) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock().await;

        if recent
            .get(&key)
            .is_some_and(|at| now.duration_since(*at) < PUSH_DEDUP_WINDOW)
        {
            return false;
        }

        recent.insert(key, now);
        if recent.len() > PUSH_DEDUP_PRUNE_AT {
            recent.retain(|_, at| now.duration_since(*at) < PUSH_DEDUP_MAX_AGE);
        }
        true
    }

    /// Number of cached keys.
    pub async fn cached(&self) -> usize {
        self.recent.lock().await.len()
    }
}

#[async_trait]
impl EventPublisher for DedupEventPublisher {
    async fn publish(&self, room: Room, event: StreamEvent) -> AppResult<()> {
        let key = format!("{}|{}|{}", event.name(), room, event.composite_key());
        if !self.admit(key).await {
            debug!(room = %room, event = event.name(), "Dropped duplicate push");
            return Ok(());
        }
        self.inner.publish(room, event).await
    }
}

/// Keeps every published event in memory. Used by tests and tooling.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<(Room, StreamEvent)>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub async fn events(&self) -> Vec<(Room, StreamEvent)> {
        self.events.lock().await.clone()
    }

    /// Names of events published to `room`, in order.
    pub async fn names_for(&self, room: &Room) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(r, _)| r == room)
            .map(|(_, e)| e.name())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, room: Room, event: StreamEvent) -> AppResult<()> {
        self.events.lock().await.push((room, event));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::notification::UserSummary;
    use quill_db::entities::notification::NotificationType;

    fn follow_event(is_following: bool) -> StreamEvent {
        StreamEvent::FollowUpdate(FollowEvent {
            follower_id: "alice".to_string(),
            followee_id: "bob".to_string(),
            is_following,
            followers_count: 1,
            timestamp: Utc::now(),
        })
    }

    fn like_notification(id: &str) -> StreamEvent {
        StreamEvent::Notification(NotificationEvent {
            notification: NotificationView {
                id: id.to_string(),
                notification_type: NotificationType::Like,
                message: "alice liked your post".to_string(),
                sender: Some(UserSummary {
                    id: "alice".to_string(),
                    username: "alice".to_string(),
                    name: None,
                    avatar_url: None,
                }),
                related_post_id: Some("post1".to_string()),
                related_comment_id: None,
                is_read: false,
                created_at: Utc::now(),
            },
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(follow_event(true)).unwrap();

        assert_eq!(json["type"], "followUpdate");
        assert_eq!(json["body"]["followerId"], "alice");
        assert_eq!(json["body"]["isFollowing"], true);
        assert!(json["body"]["timestamp"].is_string());
    }

    #[test]
    fn test_room_display() {
        assert_eq!(Room::User("u1".into()).to_string(), "user:u1");
        assert_eq!(Room::Post("p1".into()).to_string(), "post:p1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_drops_repeat_inside_window() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let publisher = DedupEventPublisher::new(recorder.clone());
        let room = Room::User("bob".to_string());

        publisher.publish(room.clone(), follow_event(true)).await.unwrap();
        publisher.publish(room.clone(), follow_event(true)).await.unwrap();
        // Different composite key passes.
        publisher.publish(room.clone(), follow_event(false)).await.unwrap();

        tokio::time::advance(PUSH_DEDUP_WINDOW).await;
        publisher.publish(room.clone(), follow_event(true)).await.unwrap();

        assert_eq!(recorder.events().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_notification_records_collapse() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let publisher = DedupEventPublisher::new(recorder.clone());
        let room = Room::User("bob".to_string());

        publisher.publish(room.clone(), like_notification("n1")).await.unwrap();
        publisher.publish(room.clone(), like_notification("n2")).await.unwrap();
        assert_eq!(recorder.events().await.len(), 1);

        tokio::time::advance(PUSH_DEDUP_WINDOW).await;
        publisher.publish(room, like_notification("n3")).await.unwrap();
        assert_eq!(recorder.events().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_event_to_different_rooms_is_delivered() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let publisher = DedupEventPublisher::new(recorder.clone());

        publisher
            .publish(Room::User("alice".into()), follow_event(true))
            .await
            .unwrap();
        publisher
            .publish(Room::User("bob".into()), follow_event(true))
            .await
            .unwrap();

        assert_eq!(recorder.events().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_pruned_past_limit() {
        let publisher = DedupEventPublisher::new(Arc::new(NoOpEventPublisher));

        for i in 0..PUSH_DEDUP_PRUNE_AT {
            publisher
                .publish(Room::User(format!("u{i}")), follow_event(true))
                .await
                .unwrap();
        }
        assert_eq!(publisher.cached().await, PUSH_DEDUP_PRUNE_AT);

        tokio::time::advance(PUSH_DEDUP_MAX_AGE).await;
        publisher
            .publish(Room::User("late".into()), follow_event(true))
            .await
            .unwrap();

        assert_eq!(publisher.cached().await, 1);
    }
}
