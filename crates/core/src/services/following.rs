//! Following service.

use chrono::Utc;
use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{
    entities::{following, notification::NotificationType},
    repositories::{FollowingRepository, UserRepository},
};
use sea_orm::Set;
use serde::Serialize;
use tracing::warn;

use crate::services::event_publisher::{EventPublisherService, FollowEvent, Room, StreamEvent};
use crate::services::jobs::JobSender;
use crate::services::notification::NotificationService;
use crate::services::{commit, rollback_conflict};

/// Result of a follow toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResult {
    pub is_following: bool,
    /// Followee's followers after the toggle.
    pub followers_count: i32,
    /// Follower's followings after the toggle.
    pub following_count: i32,
}

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    following_repo: FollowingRepository,
    user_repo: UserRepository,
    notification_service: NotificationService,
    event_publisher: Option<EventPublisherService>,
    job_sender: Option<JobSender>,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub const fn new(
        following_repo: FollowingRepository,
        user_repo: UserRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            following_repo,
            user_repo,
            notification_service,
            event_publisher: None,
            job_sender: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Set the job sender for audit records.
    pub fn set_job_sender(&mut self, job_sender: JobSender) {
        self.job_sender = Some(job_sender);
    }

    /// Check whether `follower_id` follows `followee_id`.
    pub async fn is_following(&self, follower_id: &str, followee_id: &str) -> AppResult<bool> {
        self.following_repo.is_following(follower_id, followee_id).await
    }

    /// Follow `followee_id`, or unfollow if already following.
    pub async fn toggle_follow(
        &self,
        follower_id: &str,
        followee_id: &str,
    ) -> AppResult<FollowResult> {
        // Can't follow yourself
        if follower_id == followee_id {
            return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
        }

        let follower = self.user_repo.get_by_id(follower_id).await?;
        self.user_repo.get_by_id(followee_id).await?;

        let txn = self.following_repo.begin().await?;
        let (is_following, changed) =
            match FollowingRepository::find_by_pair_for_update_in(&txn, follower_id, followee_id)
                .await?
            {
                Some(existing) => {
                    let removed = FollowingRepository::delete_in(&txn, &existing.id).await?;
                    (false, removed > 0)
                }
                None => {
                    let model = following::ActiveModel {
                        id: Set(self.id_gen.generate()),
                        follower_id: Set(follower_id.to_string()),
                        followee_id: Set(followee_id.to_string()),
                        created_at: Set(Utc::now().into()),
                    };
                    let inserted = FollowingRepository::insert_if_absent_in(&txn, model).await?;
                    (true, inserted)
                }
            };

        if changed {
            if UserRepository::step_followers_count_in(&txn, followee_id, is_following).await? == 0 {
                return Err(
                    rollback_conflict(txn, format!("user {followee_id} counter not updated")).await,
                );
            }
            if UserRepository::step_following_count_in(&txn, follower_id, is_following).await? == 0 {
                return Err(
                    rollback_conflict(txn, format!("user {follower_id} counter not updated")).await,
                );
            }
        }
        commit(txn).await?;

        let followers_count = self.user_repo.get_by_id(followee_id).await?.followers_count;
        let following_count = self.user_repo.get_by_id(follower_id).await?.following_count;

        if let Some(ref publisher) = self.event_publisher {
            for user_id in [followee_id, follower_id] {
                let event = StreamEvent::FollowUpdate(FollowEvent {
                    follower_id: follower_id.to_string(),
                    followee_id: followee_id.to_string(),
                    is_following,
                    followers_count,
                    timestamp: Utc::now(),
                });
                if let Err(e) = publisher.publish(Room::User(user_id.to_string()), event).await {
                    warn!(user_id = %user_id, error = %e, "Failed to publish follow update");
                }
            }
        }

        if let Some(ref job_sender) = self.job_sender {
            let action = if is_following { "follow" } else { "unfollow" };
            job_sender.record_activity(follower_id, action, Some(followee_id), Some("user"));
        }

        if is_following && changed {
            let name = follower.name.as_deref().unwrap_or(&follower.username);
            if let Err(e) = self
                .notification_service
                .notify(
                    followee_id,
                    follower_id,
                    NotificationType::Follow,
                    &format!("{name} started following you"),
                    None,
                    None,
                )
                .await
            {
                warn!(followee_id = %followee_id, error = %e, "Failed to notify followee");
            }
        }

        Ok(FollowResult {
            is_following,
            followers_count,
            following_count,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::RecordingEventPublisher;
    use quill_db::{
        repositories::{NotificationPreferenceRepository, NotificationRepository},
        test_utils::TestDatabase,
    };
    use std::sync::Arc;

    async fn setup() -> (TestDatabase, FollowingService, Arc<RecordingEventPublisher>) {
        let db = TestDatabase::in_memory().await.unwrap();
        db.insert_user("alice").await.unwrap();
        db.insert_user("bob").await.unwrap();
        let conn = db.connection();
        let events = Arc::new(RecordingEventPublisher::new());

        let mut notifications = NotificationService::new(
            NotificationRepository::new(conn.clone()),
            NotificationPreferenceRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
        );
        notifications.set_event_publisher(events.clone());

        let mut service = FollowingService::new(
            FollowingRepository::new(conn.clone()),
            UserRepository::new(conn),
            notifications,
        );
        service.set_event_publisher(events.clone());
        (db, service, events)
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let (db, service, events) = setup().await;

        let followed = service.toggle_follow("alice", "bob").await.unwrap();
        assert_eq!(
            followed,
            FollowResult {
                is_following: true,
                followers_count: 1,
                following_count: 1
            }
        );
        assert!(service.is_following("alice", "bob").await.unwrap());

        let unfollowed = service.toggle_follow("alice", "bob").await.unwrap();
        assert!(!unfollowed.is_following);
        assert_eq!(unfollowed.followers_count, 0);
        assert_eq!(unfollowed.following_count, 0);

        let bob_events = events.names_for(&Room::User("bob".to_string())).await;
        assert_eq!(bob_events, vec!["followUpdate", "notification", "followUpdate"]);
        let alice_events = events.names_for(&Room::User("alice".to_string())).await;
        assert_eq!(alice_events, vec!["followUpdate", "followUpdate"]);

        let user = UserRepository::new(db.connection()).get_by_id("bob").await.unwrap();
        assert_eq!(user.followers_count, 0);
    }

    #[tokio::test]
    async fn test_refollow_within_window_notifies_once() {
        let (db, service, _events) = setup().await;

        service.toggle_follow("alice", "bob").await.unwrap();
        service.toggle_follow("alice", "bob").await.unwrap();
        service.toggle_follow("alice", "bob").await.unwrap();

        let repo = NotificationRepository::new(db.connection());
        assert_eq!(repo.count_by_type("bob", NotificationType::Follow).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_follow_errors() {
        let (_db, service, _events) = setup().await;

        let err = service.toggle_follow("alice", "alice").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = service.toggle_follow("alice", "nobody").await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }
}
