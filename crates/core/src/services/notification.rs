//! Notification service.

use std::collections::{HashMap, HashSet, hash_map::Entry};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{
    entities::{
        notification::{self, NotificationType},
        notification_preference, user,
    },
    repositories::{NotificationPreferenceRepository, NotificationRepository, UserRepository},
};
use regex::Regex;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::services::email::{Locale, NotificationEmail};
use crate::services::event_publisher::{
    EventPublisherService, NotificationEvent, Room, StreamEvent,
};
use crate::services::jobs::JobSender;

/// A repeated follow from the same sender inside this window is not notified.
const FOLLOW_DEDUP_SECS: i64 = 60;

/// Largest page size for notification lists.
const MAX_LIMIT: u64 = 100;

#[allow(clippy::expect_used)]
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]{1,32})").expect("valid mention regex"));

/// Public fields of a user shown next to notifications and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    /// Name to show for the user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// A notification with its sender's display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub sender: Option<UserSummary>,
    pub related_post_id: Option<String>,
    pub related_comment_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationView {
    fn new(model: notification::Model, sender: Option<UserSummary>) -> Self {
        Self {
            id: model.id,
            notification_type: model.notification_type,
            message: model.message,
            sender,
            related_post_id: model.related_post_id,
            related_comment_id: model.related_comment_id,
            is_read: model.is_read,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Delivery channels for one notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPreference {
    pub in_app: bool,
    pub email: bool,
}

impl From<(bool, bool)> for ChannelPreference {
    fn from((in_app, email): (bool, bool)) -> Self {
        Self { in_app, email }
    }
}

/// A user's preferences keyed by notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub mentions: ChannelPreference,
    pub comments: ChannelPreference,
    pub replies: ChannelPreference,
    pub bookmarks: ChannelPreference,
    pub likes: ChannelPreference,
    pub follows: ChannelPreference,
}

impl From<&notification_preference::Model> for NotificationPreferences {
    fn from(model: &notification_preference::Model) -> Self {
        Self {
            mentions: model.channels(NotificationType::Mention).into(),
            comments: model.channels(NotificationType::Comment).into(),
            replies: model.channels(NotificationType::Reply).into(),
            bookmarks: model.channels(NotificationType::Bookmark).into(),
            likes: model.channels(NotificationType::Like).into(),
            follows: model.channels(NotificationType::Follow).into(),
        }
    }
}

/// Partial update of one type's channels.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPreferenceUpdate {
    pub in_app: Option<bool>,
    pub email: Option<bool>,
}

/// Partial update of a user's preferences. Omitted fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferencesUpdate {
    pub mentions: Option<ChannelPreferenceUpdate>,
    pub comments: Option<ChannelPreferenceUpdate>,
    pub replies: Option<ChannelPreferenceUpdate>,
    pub bookmarks: Option<ChannelPreferenceUpdate>,
    pub likes: Option<ChannelPreferenceUpdate>,
    pub follows: Option<ChannelPreferenceUpdate>,
}

/// Unique `@username` mentions in `content`, in order of first appearance.
#[must_use]
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION_RE
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    preference_repo: NotificationPreferenceRepository,
    user_repo: UserRepository,
    event_publisher: Option<EventPublisherService>,
    job_sender: Option<JobSender>,
    id_gen: IdGenerator,
    /// Last follow notification per (recipient, sender), whatever the channels.
    recent_follows: Arc<Mutex<HashMap<(String, String), Instant>>>,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(
        notification_repo: NotificationRepository,
        preference_repo: NotificationPreferenceRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            notification_repo,
            preference_repo,
            user_repo,
            event_publisher: None,
            job_sender: None,
            id_gen: IdGenerator::new(),
            recent_follows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Set the job sender for email delivery.
    pub fn set_job_sender(&mut self, job_sender: JobSender) {
        self.job_sender = Some(job_sender);
    }

    /// Notify `recipient_id` about something `sender_id` did.
    ///
    /// Returns the stored notification, or `None` when nothing was stored:
    /// self-notifications, repeated follows, and types the recipient has
    /// turned off in-app. Email goes out independently of the in-app flag.
    pub async fn notify(
        &self,
        recipient_id: &str,
        sender_id: &str,
        notification_type: NotificationType,
        message: &str,
        related_post_id: Option<&str>,
        related_comment_id: Option<&str>,
    ) -> AppResult<Option<notification::Model>> {
        if recipient_id == sender_id {
            return Ok(None);
        }

        let prefs = self.preference_repo.get_or_create(recipient_id).await?;
        let (in_app, email) = prefs.channels(notification_type);

        if notification_type == NotificationType::Follow {
            let since = Utc::now() - Duration::seconds(FOLLOW_DEDUP_SECS);
            if !self.admit_follow(recipient_id, sender_id).await
                || self
                    .notification_repo
                    .exists_since(recipient_id, sender_id, NotificationType::Follow, since)
                    .await?
            {
                debug!(recipient_id = %recipient_id, sender_id = %sender_id, "Suppressed repeated follow notification");
                return Ok(None);
            }
        }

        let sender = self
            .user_repo
            .find_by_id(sender_id)
            .await?
            .map(|u| UserSummary::from(&u));

        let created = if in_app {
            let model = notification::ActiveModel {
                id: Set(self.id_gen.generate()),
                recipient_id: Set(recipient_id.to_string()),
                sender_id: Set(sender_id.to_string()),
                notification_type: Set(notification_type),
                message: Set(message.to_string()),
                related_post_id: Set(related_post_id.map(ToString::to_string)),
                related_comment_id: Set(related_comment_id.map(ToString::to_string)),
                is_read: Set(false),
                created_at: Set(Utc::now().into()),
            };
            let created = self.notification_repo.create(model).await?;
            self.push(recipient_id, &created, sender.clone()).await;
            Some(created)
        } else {
            debug!(recipient_id = %recipient_id, notification_type = ?notification_type, "In-app notification disabled");
            None
        };

        if email {
            self.queue_email(
                recipient_id,
                notification_type,
                sender.as_ref(),
                message,
                related_post_id,
            )
            .await;
        }

        Ok(created)
    }

    /// Record a follow notification, returning `false` if one went out inside the window.
    async fn admit_follow(&self, recipient_id: &str, sender_id: &str) -> bool {
        let now = Instant::now();
        let window = std::time::Duration::from_secs(FOLLOW_DEDUP_SECS.unsigned_abs());
        let mut recent = self.recent_follows.lock().await;
        recent.retain(|_, at| now.duration_since(*at) < window);

        match recent.entry((recipient_id.to_string(), sender_id.to_string())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    async fn push(&self, recipient_id: &str, model: &notification::Model, sender: Option<UserSummary>) {
        let Some(ref publisher) = self.event_publisher else {
            return;
        };

        let event = StreamEvent::Notification(NotificationEvent {
            notification: NotificationView::new(model.clone(), sender),
            timestamp: Utc::now(),
        });
        if let Err(e) = publisher
            .publish(Room::User(recipient_id.to_string()), event)
            .await
        {
            warn!(recipient_id = %recipient_id, error = %e, "Failed to push notification");
        }
    }

    async fn queue_email(
        &self,
        recipient_id: &str,
        notification_type: NotificationType,
        sender: Option<&UserSummary>,
        message: &str,
        related_post_id: Option<&str>,
    ) {
        let Some(ref job_sender) = self.job_sender else {
            return;
        };

        let recipient = match self.user_repo.find_by_id(recipient_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(recipient_id = %recipient_id, error = %e, "Failed to load email recipient");
                return;
            }
        };
        let Some(to) = recipient.email.clone() else {
            debug!(recipient_id = %recipient_id, "Recipient has no email address");
            return;
        };

        job_sender.send_email(NotificationEmail {
            to,
            to_name: Some(UserSummary::from(&recipient).display_name().to_string()),
            locale: Locale::from_tag(&recipient.locale),
            notification_type,
            sender_name: sender.map_or("Someone", UserSummary::display_name).to_string(),
            message: message.to_string(),
            related_post_id: related_post_id.map(ToString::to_string),
        });
    }

    /// Send a mention notification to every user named in `content`.
    ///
    /// Returns the number of notifications stored.
    pub async fn notify_mentions(
        &self,
        author_id: &str,
        content: &str,
        post_id: &str,
        comment_id: &str,
    ) -> AppResult<usize> {
        let usernames = extract_mentions(content);
        if usernames.is_empty() {
            return Ok(0);
        }

        let mentioned = self.user_repo.find_by_usernames(&usernames).await?;
        let author_name = self
            .user_repo
            .find_by_id(author_id)
            .await?
            .map_or_else(|| "Someone".to_string(), |u| UserSummary::from(&u).display_name().to_string());
        let message = format!("{author_name} mentioned you in a comment");

        let mut count = 0;
        for user in mentioned.iter().filter(|u| u.id != author_id) {
            if self
                .notify(
                    &user.id,
                    author_id,
                    NotificationType::Mention,
                    &message,
                    Some(post_id),
                    Some(comment_id),
                )
                .await?
                .is_some()
            {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Get notifications for a user, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<NotificationView>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let notifications = self
            .notification_repo
            .find_by_recipient(user_id, limit, until_id, unread_only)
            .await?;

        let mut sender_ids: Vec<String> =
            notifications.iter().map(|n| n.sender_id.clone()).collect();
        sender_ids.sort_unstable();
        sender_ids.dedup();
        let senders: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&sender_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect();

        Ok(notifications
            .into_iter()
            .map(|n| {
                let sender = senders.get(&n.sender_id).cloned();
                NotificationView::new(n, sender)
            })
            .collect())
    }

    /// Mark one notification as read.
    pub async fn mark_as_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        let changed = self
            .notification_repo
            .mark_as_read(notification_id, user_id)
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Notification {notification_id}")));
        }
        Ok(())
    }

    /// Mark all notifications as read. Returns how many changed.
    pub async fn mark_all_as_read(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.mark_all_as_read(user_id).await
    }

    /// Count unread notifications.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Delete one notification.
    pub async fn delete(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        let deleted = self.notification_repo.delete(notification_id, user_id).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Notification {notification_id}")));
        }
        Ok(())
    }

    /// Delete every notification of a user. Returns how many were removed.
    pub async fn delete_all(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.delete_all_for_user(user_id).await
    }

    /// Get a user's preferences, creating defaults on first use.
    pub async fn get_preferences(&self, user_id: &str) -> AppResult<NotificationPreferences> {
        let prefs = self.preference_repo.get_or_create(user_id).await?;
        Ok(NotificationPreferences::from(&prefs))
    }

    /// Apply a partial preference update.
    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: NotificationPreferencesUpdate,
    ) -> AppResult<NotificationPreferences> {
        let prefs = self.preference_repo.get_or_create(user_id).await?;
        let mut active: notification_preference::ActiveModel = prefs.into();

        macro_rules! apply {
            ($field:ident, $in_app:ident, $email:ident) => {
                if let Some(channel) = update.$field {
                    if let Some(v) = channel.in_app {
                        active.$in_app = Set(v);
                    }
                    if let Some(v) = channel.email {
                        active.$email = Set(v);
                    }
                }
            };
        }

        apply!(mentions, mentions_in_app, mentions_email);
        apply!(comments, comments_in_app, comments_email);
        apply!(replies, replies_in_app, replies_email);
        apply!(bookmarks, bookmarks_in_app, bookmarks_email);
        apply!(likes, likes_in_app, likes_email);
        apply!(follows, follows_in_app, follows_email);

        let updated = self.preference_repo.update(active).await?;
        Ok(NotificationPreferences::from(&updated))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::RecordingEventPublisher;
    use crate::services::jobs::{Job, JobService};
    use quill_db::test_utils::TestDatabase;
    use std::sync::Arc;

    struct Harness {
        db: TestDatabase,
        service: NotificationService,
        events: Arc<RecordingEventPublisher>,
        jobs: JobService,
    }

    async fn harness() -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        for id in ["alice", "bob", "carol"] {
            db.insert_user(id).await.unwrap();
        }
        let conn = db.connection();
        let mut service = NotificationService::new(
            NotificationRepository::new(conn.clone()),
            NotificationPreferenceRepository::new(conn.clone()),
            UserRepository::new(conn),
        );
        let events = Arc::new(RecordingEventPublisher::new());
        let jobs = JobService::new();
        service.set_event_publisher(events.clone());
        service.set_job_sender(jobs.sender());
        Harness {
            db,
            service,
            events,
            jobs,
        }
    }

    #[test]
    fn test_extract_mentions() {
        assert_eq!(
            extract_mentions("hi @bob and @Carol, also @bob again and @BOB"),
            vec!["bob".to_string(), "Carol".to_string()]
        );
        assert!(extract_mentions("no mentions here @").is_empty());
    }

    #[tokio::test]
    async fn test_self_notification_is_suppressed() {
        let h = harness().await;

        let result = h
            .service
            .notify("alice", "alice", NotificationType::Like, "liked", None, None)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(h.service.unread_count("alice").await.unwrap(), 0);
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_like_is_stored_and_pushed_without_email() {
        let mut h = harness().await;

        let created = h
            .service
            .notify("bob", "alice", NotificationType::Like, "alice liked your post", Some("post1"), None)
            .await
            .unwrap();

        assert!(created.is_some());
        assert_eq!(
            h.events.names_for(&Room::User("bob".to_string())).await,
            vec!["notification"]
        );
        assert!(h.jobs.drain().is_empty());
    }

    #[tokio::test]
    async fn test_reply_queues_email_by_default() {
        let mut h = harness().await;

        h.service
            .notify("bob", "alice", NotificationType::Reply, "alice replied", Some("post1"), Some("c1"))
            .await
            .unwrap();

        let jobs = h.jobs.drain();
        assert_eq!(jobs.len(), 1);
        match &jobs[0] {
            Job::SendEmail(email) => {
                assert_eq!(email.to, "bob@example.com");
                assert_eq!(email.sender_name, "alice");
                assert_eq!(email.notification_type, NotificationType::Reply);
            }
            other => panic!("unexpected job {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_app_disabled_stores_nothing_but_still_emails() {
        let mut h = harness().await;
        h.service
            .update_preferences(
                "bob",
                NotificationPreferencesUpdate {
                    likes: Some(ChannelPreferenceUpdate {
                        in_app: Some(false),
                        email: Some(true),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let created = h
            .service
            .notify("bob", "alice", NotificationType::Like, "liked", Some("post1"), None)
            .await
            .unwrap();

        assert!(created.is_none());
        assert_eq!(h.service.unread_count("bob").await.unwrap(), 0);
        assert!(h.events.events().await.is_empty());
        assert_eq!(h.jobs.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_follow_email_only_is_sent_once() {
        let mut h = harness().await;
        h.service
            .update_preferences(
                "bob",
                NotificationPreferencesUpdate {
                    follows: Some(ChannelPreferenceUpdate {
                        in_app: Some(false),
                        email: Some(true),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        for _ in 0..3 {
            let created = h
                .service
                .notify("bob", "alice", NotificationType::Follow, "followed", None, None)
                .await
                .unwrap();
            assert!(created.is_none());
        }

        let emails = h
            .jobs
            .drain()
            .into_iter()
            .filter(|job| matches!(job, Job::SendEmail(_)))
            .count();
        assert_eq!(emails, 1);
        assert_eq!(h.service.unread_count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeated_follow_within_window_is_suppressed() {
        let h = harness().await;

        let first = h
            .service
            .notify("bob", "alice", NotificationType::Follow, "followed", None, None)
            .await
            .unwrap();
        let second = h
            .service
            .notify("bob", "alice", NotificationType::Follow, "followed", None, None)
            .await
            .unwrap();
        // A different sender is not affected.
        let other = h
            .service
            .notify("bob", "carol", NotificationType::Follow, "followed", None, None)
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other.is_some());
        let repo = NotificationRepository::new(h.db.connection());
        assert_eq!(repo.count_by_type("bob", NotificationType::Follow).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_notify_mentions_resolves_unique_users() {
        let h = harness().await;

        let count = h
            .service
            .notify_mentions("alice", "@bob @BOB @carol @alice @ghost", "post1", "c1")
            .await
            .unwrap();

        assert_eq!(count, 2);
        let repo = NotificationRepository::new(h.db.connection());
        assert_eq!(repo.count_by_type("bob", NotificationType::Mention).await.unwrap(), 1);
        assert_eq!(repo.count_by_type("carol", NotificationType::Mention).await.unwrap(), 1);
        assert_eq!(repo.count_by_type("alice", NotificationType::Mention).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_read_and_delete() {
        let h = harness().await;
        let n = h
            .service
            .notify("bob", "alice", NotificationType::Comment, "commented", Some("post1"), None)
            .await
            .unwrap()
            .unwrap();

        let listed = h.service.list("bob", 20, None, false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sender.as_ref().map(|s| s.id.as_str()), Some("alice"));

        let err = h.service.mark_as_read("carol", &n.id).await.unwrap_err();
        assert!(err.is_not_found());

        h.service.mark_as_read("bob", &n.id).await.unwrap();
        assert_eq!(h.service.unread_count("bob").await.unwrap(), 0);
        assert!(h.service.list("bob", 20, None, true).await.unwrap().is_empty());

        h.service.delete("bob", &n.id).await.unwrap();
        assert!(h.service.delete("bob", &n.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_preferences_defaults_and_partial_update() {
        let h = harness().await;

        let prefs = h.service.get_preferences("carol").await.unwrap();
        assert_eq!(prefs.mentions, ChannelPreference { in_app: true, email: true });
        assert_eq!(prefs.likes, ChannelPreference { in_app: true, email: false });

        let updated = h
            .service
            .update_preferences(
                "carol",
                NotificationPreferencesUpdate {
                    follows: Some(ChannelPreferenceUpdate {
                        in_app: None,
                        email: Some(true),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.follows, ChannelPreference { in_app: true, email: true });
        assert_eq!(updated.mentions, prefs.mentions);
    }
}
