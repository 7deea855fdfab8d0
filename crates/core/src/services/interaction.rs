//! Interaction ledger: likes, bookmarks, shares and views.
//!
//! The `interaction` table is the source of truth. Post, comment and user
//! counters are mirrors stepped in the same transaction as the record flip
//! and can be recomputed with the `rebuild_*` methods.

use chrono::Utc;
use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{
    entities::{
        interaction::{self, InteractionKind, SubjectType},
        notification::NotificationType,
        post_view,
    },
    repositories::{
        CommentRepository, InteractionRepository, PostCounters, PostRepository,
        PostViewRepository, UserRepository,
    },
};
use sea_orm::{ConnectionTrait, Set};
use serde::Serialize;
use tracing::{debug, warn};

use crate::services::event_publisher::{
    CommentLikeEvent, EventPublisherService, Room, StreamEvent,
};
use crate::services::interaction_guard::{InteractionGuardService, Viewer};
use crate::services::jobs::JobSender;
use crate::services::notification::NotificationService;
use crate::services::{commit, rollback_conflict};

/// Outcome of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResult {
    /// `like`, `unlike`, `bookmark`, `unbookmark` or `share`.
    pub action: &'static str,
    pub is_active: bool,
    /// Active records of this kind on the subject after the toggle.
    pub count: u64,
}

/// Recomputed user mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounters {
    pub liked_posts: i32,
    pub bookmarks: i32,
}

/// Interaction service for business logic.
#[derive(Clone)]
pub struct InteractionService {
    interaction_repo: InteractionRepository,
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    user_repo: UserRepository,
    post_view_repo: PostViewRepository,
    guard: InteractionGuardService,
    notification_service: NotificationService,
    event_publisher: Option<EventPublisherService>,
    job_sender: Option<JobSender>,
    id_gen: IdGenerator,
}

impl InteractionService {
    /// Create a new interaction service.
    #[must_use]
    pub const fn new(
        interaction_repo: InteractionRepository,
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        user_repo: UserRepository,
        post_view_repo: PostViewRepository,
        guard: InteractionGuardService,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            interaction_repo,
            post_repo,
            comment_repo,
            user_repo,
            post_view_repo,
            guard,
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

    /// Like or unlike a post.
    pub async fn toggle_post_like(&self, actor_id: &str, post_id: &str) -> AppResult<ToggleResult> {
        self.toggle_post(actor_id, post_id, InteractionKind::Like)
            .await
    }

    /// Bookmark or unbookmark a post.
    pub async fn toggle_post_bookmark(
        &self,
        actor_id: &str,
        post_id: &str,
    ) -> AppResult<ToggleResult> {
        self.toggle_post(actor_id, post_id, InteractionKind::Bookmark)
            .await
    }

    async fn toggle_post(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: InteractionKind,
    ) -> AppResult<ToggleResult> {
        if !self.guard.should_accept(actor_id, post_id).await {
            return Err(AppError::RateLimited);
        }

        let post = self.post_repo.get_by_id(post_id).await?;

        let txn = self.interaction_repo.begin().await?;
        let is_active =
            self.flip_in(&txn, post_id, SubjectType::Post, actor_id, kind).await?;

        // Post and user mirrors move together or not at all.
        if PostRepository::step_interaction_count_in(&txn, post_id, kind, is_active).await? == 0 {
            return Err(rollback_conflict(txn, format!("post {post_id} counter not updated")).await);
        }
        if UserRepository::step_interaction_count_in(&txn, actor_id, kind, is_active).await? == 0 {
            return Err(rollback_conflict(txn, format!("user {actor_id} counter not updated")).await);
        }

        let count = InteractionRepository::count_active_in(&txn, post_id, kind).await?;
        commit(txn).await?;

        let action = kind.action(is_active);
        debug!(actor_id = %actor_id, post_id = %post_id, action, "Post interaction toggled");
        self.record_activity(actor_id, action, post_id, "post");

        if is_active {
            let (notification_type, verb) = match kind {
                InteractionKind::Bookmark => (NotificationType::Bookmark, "bookmarked"),
                _ => (NotificationType::Like, "liked"),
            };
            let actor_name = self.display_name(actor_id).await;
            self.notify_owner(
                &post.user_id,
                actor_id,
                notification_type,
                &format!("{actor_name} {verb} your post \"{}\"", post.title),
                post_id,
                None,
            )
            .await;
        }

        Ok(ToggleResult {
            action,
            is_active,
            count,
        })
    }

    /// Like or unlike a comment.
    pub async fn toggle_comment_like(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> AppResult<ToggleResult> {
        if !self.guard.should_accept(actor_id, comment_id).await {
            return Err(AppError::RateLimited);
        }

        let comment = self.comment_repo.get_by_id(comment_id).await?;

        let txn = self.interaction_repo.begin().await?;
        let is_active = self
            .flip_in(&txn, comment_id, SubjectType::Comment, actor_id, InteractionKind::Like)
            .await?;

        if CommentRepository::step_likes_count_in(&txn, comment_id, is_active).await? == 0 {
            return Err(
                rollback_conflict(txn, format!("comment {comment_id} counter not updated")).await,
            );
        }

        let count =
            InteractionRepository::count_active_in(&txn, comment_id, InteractionKind::Like).await?;
        commit(txn).await?;

        let action = InteractionKind::Like.action(is_active);
        self.record_activity(actor_id, action, comment_id, "comment");

        if let Some(ref publisher) = self.event_publisher {
            let event = StreamEvent::CommentLikeUpdate(CommentLikeEvent {
                post_id: comment.post_id.clone(),
                comment_id: comment_id.to_string(),
                actor_id: actor_id.to_string(),
                is_liked: is_active,
                likes_count: count,
                timestamp: Utc::now(),
            });
            if let Err(e) = publisher
                .publish(Room::Post(comment.post_id.clone()), event)
                .await
            {
                warn!(comment_id = %comment_id, error = %e, "Failed to publish comment like");
            }
        }

        if is_active {
            let actor_name = self.display_name(actor_id).await;
            self.notify_owner(
                &comment.user_id,
                actor_id,
                NotificationType::Like,
                &format!("{actor_name} liked your comment"),
                &comment.post_id,
                Some(comment_id),
            )
            .await;
        }

        Ok(ToggleResult {
            action,
            is_active,
            count,
        })
    }

    /// Record that `actor_id` shared a post. Repeated shares are no-ops.
    pub async fn record_share(&self, actor_id: &str, post_id: &str) -> AppResult<ToggleResult> {
        if !self.guard.should_accept(actor_id, post_id).await {
            return Err(AppError::RateLimited);
        }

        self.post_repo.get_by_id(post_id).await?;

        let kind = InteractionKind::Share;
        let txn = self.interaction_repo.begin().await?;
        let activated = match InteractionRepository::find_for_update_in(&txn, post_id, actor_id, kind)
            .await?
        {
            Some(existing) if existing.is_active => false,
            Some(existing) => {
                InteractionRepository::set_active_in(&txn, &existing.id, true).await?;
                true
            }
            None => {
                let model = self.new_record(post_id, SubjectType::Post, actor_id, kind);
                InteractionRepository::insert_if_absent_in(&txn, model).await?
            }
        };

        if activated
            && PostRepository::step_interaction_count_in(&txn, post_id, kind, true).await? == 0
        {
            return Err(rollback_conflict(txn, format!("post {post_id} counter not updated")).await);
        }

        let count = InteractionRepository::count_active_in(&txn, post_id, kind).await?;
        commit(txn).await?;

        if activated {
            self.record_activity(actor_id, kind.action(true), post_id, "post");
        }

        Ok(ToggleResult {
            action: kind.action(true),
            is_active: true,
            count,
        })
    }

    /// Log a view unless the guard has seen this viewer recently.
    ///
    /// Returns whether the view was counted.
    pub async fn record_view(&self, post_id: &str, viewer: &Viewer) -> AppResult<bool> {
        self.post_repo.get_by_id(post_id).await?;

        if !self.guard.should_record_view(post_id, viewer).await {
            debug!(post_id = %post_id, "View not counted");
            return Ok(false);
        }

        let (viewer_id, ip_address) = match viewer {
            Viewer::User(id) => (Some(id.clone()), None),
            Viewer::Anonymous(ip) => (None, Some(ip.clone())),
        };
        self.post_view_repo
            .create(post_view::ActiveModel {
                id: Set(self.id_gen.generate()),
                post_id: Set(post_id.to_string()),
                viewer_id: Set(viewer_id),
                ip_address: Set(ip_address),
                created_at: Set(Utc::now().into()),
            })
            .await?;
        self.post_repo.increment_views_count(post_id).await?;

        if let Viewer::User(id) = viewer {
            self.record_activity(id, "view", post_id, "post");
        }
        Ok(true)
    }

    /// Recompute a post's counters from the canonical tables.
    pub async fn rebuild_post_counters(&self, post_id: &str) -> AppResult<PostCounters> {
        self.post_repo.get_by_id(post_id).await?;

        let counters = PostCounters {
            likes: self
                .interaction_repo
                .count_active(post_id, InteractionKind::Like)
                .await? as i32,
            bookmarks: self
                .interaction_repo
                .count_active(post_id, InteractionKind::Bookmark)
                .await? as i32,
            shares: self
                .interaction_repo
                .count_active(post_id, InteractionKind::Share)
                .await? as i32,
            views: self.post_view_repo.count_by_post(post_id).await? as i32,
            comments: self.comment_repo.count_top_level(post_id).await? as i32,
        };
        self.post_repo.set_counters(post_id, counters).await?;
        Ok(counters)
    }

    /// Recompute a user's like and bookmark mirrors.
    pub async fn rebuild_user_counters(&self, user_id: &str) -> AppResult<UserCounters> {
        self.user_repo.get_by_id(user_id).await?;

        let counters = UserCounters {
            liked_posts: self
                .interaction_repo
                .count_active_by_actor(user_id, SubjectType::Post, InteractionKind::Like)
                .await? as i32,
            bookmarks: self
                .interaction_repo
                .count_active_by_actor(user_id, SubjectType::Post, InteractionKind::Bookmark)
                .await? as i32,
        };
        self.user_repo
            .set_interaction_counts(user_id, counters.liked_posts, counters.bookmarks)
            .await?;
        Ok(counters)
    }

    /// Flip the record for a triple, creating it active if absent.
    ///
    /// Returns the new `is_active`.
    async fn flip_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject_id: &str,
        subject_type: SubjectType,
        actor_id: &str,
        kind: InteractionKind,
    ) -> AppResult<bool> {
        match InteractionRepository::find_for_update_in(conn, subject_id, actor_id, kind).await? {
            Some(existing) => Self::flip_existing_in(conn, &existing).await,
            None => {
                self.insert_or_flip_in(conn, subject_id, subject_type, actor_id, kind)
                    .await
            }
        }
    }

    /// Insert an active record; if the triple already exists, flip that row instead.
    async fn insert_or_flip_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject_id: &str,
        subject_type: SubjectType,
        actor_id: &str,
        kind: InteractionKind,
    ) -> AppResult<bool> {
        let model = self.new_record(subject_id, subject_type, actor_id, kind);
        if InteractionRepository::insert_if_absent_in(conn, model).await? {
            return Ok(true);
        }

        // A concurrent request created the row first.
        let existing = InteractionRepository::find_for_update_in(conn, subject_id, actor_id, kind)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("interaction on {subject_id} in flux")))?;
        Self::flip_existing_in(conn, &existing).await
    }

    async fn flip_existing_in<C: ConnectionTrait>(
        conn: &C,
        existing: &interaction::Model,
    ) -> AppResult<bool> {
        let next = !existing.is_active;
        InteractionRepository::set_active_in(conn, &existing.id, next).await?;
        Ok(next)
    }

    fn new_record(
        &self,
        subject_id: &str,
        subject_type: SubjectType,
        actor_id: &str,
        kind: InteractionKind,
    ) -> interaction::ActiveModel {
        let now = Utc::now();
        interaction::ActiveModel {
            id: Set(self.id_gen.generate()),
            subject_id: Set(subject_id.to_string()),
            subject_type: Set(subject_type),
            actor_id: Set(actor_id.to_string()),
            kind: Set(kind),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }

    fn record_activity(&self, actor_id: &str, action: &str, subject_id: &str, subject_type: &str) {
        if let Some(ref job_sender) = self.job_sender {
            job_sender.record_activity(actor_id, action, Some(subject_id), Some(subject_type));
        }
    }

    async fn display_name(&self, user_id: &str) -> String {
        match self.user_repo.find_by_id(user_id).await {
            Ok(Some(user)) => user.name.unwrap_or(user.username),
            _ => "Someone".to_string(),
        }
    }

    async fn notify_owner(
        &self,
        owner_id: &str,
        actor_id: &str,
        notification_type: NotificationType,
        message: &str,
        post_id: &str,
        comment_id: Option<&str>,
    ) {
        if let Err(e) = self
            .notification_service
            .notify(
                owner_id,
                actor_id,
                notification_type,
                message,
                Some(post_id),
                comment_id,
            )
            .await
        {
            warn!(owner_id = %owner_id, error = %e, "Failed to notify owner");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::RecordingEventPublisher;
    use crate::services::interaction_guard::{InMemoryInteractionGuard, InteractionGuard};
    use crate::services::jobs::JobService;
    use async_trait::async_trait;
    use quill_db::{
        repositories::{NotificationPreferenceRepository, NotificationRepository},
        test_utils::TestDatabase,
    };
    use std::sync::Arc;

    struct AllowAll;

    #[async_trait]
    impl InteractionGuard for AllowAll {
        async fn should_accept(&self, _actor_id: &str, _subject_id: &str) -> bool {
            true
        }

        async fn should_record_view(&self, _subject_id: &str, _viewer: &Viewer) -> bool {
            true
        }

        async fn sweep(&self) -> usize {
            0
        }
    }

    struct Harness {
        db: TestDatabase,
        service: InteractionService,
        events: Arc<RecordingEventPublisher>,
        jobs: JobService,
    }

    async fn harness_with(guard: InteractionGuardService) -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        db.insert_user("alice").await.unwrap();
        db.insert_user("bob").await.unwrap();
        db.insert_post("post1", "bob").await.unwrap();
        db.insert_comment("c1", "post1", "bob", None).await.unwrap();

        let conn = db.connection();
        let events = Arc::new(RecordingEventPublisher::new());
        let jobs = JobService::new();

        let mut notifications = NotificationService::new(
            NotificationRepository::new(conn.clone()),
            NotificationPreferenceRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
        );
        notifications.set_event_publisher(events.clone());

        let mut service = InteractionService::new(
            InteractionRepository::new(conn.clone()),
            PostRepository::new(conn.clone()),
            CommentRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
            PostViewRepository::new(conn),
            guard,
            notifications,
        );
        service.set_event_publisher(events.clone());
        service.set_job_sender(jobs.sender());

        Harness {
            db,
            service,
            events,
            jobs,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(AllowAll)).await
    }

    #[tokio::test]
    async fn test_like_then_unlike() {
        let h = harness().await;

        let first = h.service.toggle_post_like("alice", "post1").await.unwrap();
        assert_eq!(
            first,
            ToggleResult {
                action: "like",
                is_active: true,
                count: 1
            }
        );
        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        let user = UserRepository::new(h.db.connection()).get_by_id("alice").await.unwrap();
        assert_eq!(post.likes_count, 1);
        assert_eq!(user.liked_posts_count, 1);

        let second = h.service.toggle_post_like("alice", "post1").await.unwrap();
        assert_eq!(
            second,
            ToggleResult {
                action: "unlike",
                is_active: false,
                count: 0
            }
        );

        let repo = InteractionRepository::new(h.db.connection());
        assert_eq!(
            repo.count_records("post1", "alice", InteractionKind::Like).await.unwrap(),
            1
        );
        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        let user = UserRepository::new(h.db.connection()).get_by_id("alice").await.unwrap();
        assert_eq!(post.likes_count, 0);
        assert_eq!(user.liked_posts_count, 0);
    }

    #[tokio::test]
    async fn test_toggle_parity() {
        let h = harness().await;

        let mut last = None;
        for _ in 0..5 {
            last = Some(h.service.toggle_post_bookmark("alice", "post1").await.unwrap());
        }

        let last = last.unwrap();
        assert!(last.is_active);
        assert_eq!(last.action, "bookmark");
        let user = UserRepository::new(h.db.connection()).get_by_id("alice").await.unwrap();
        assert_eq!(user.bookmarks_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_keep_one_record() {
        let h = harness().await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move { service.toggle_post_like("alice", "post1").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let repo = InteractionRepository::new(h.db.connection());
        assert_eq!(
            repo.count_records("post1", "alice", InteractionKind::Like).await.unwrap(),
            1
        );
        let active = repo.count_active("post1", InteractionKind::Like).await.unwrap();
        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        assert_eq!(active, 0);
        assert_eq!(post.likes_count, 0);
    }

    #[tokio::test]
    async fn test_insert_race_flips_existing_row() {
        let h = harness().await;
        let conn = h.db.connection();

        // First insert wins; the next two find the triple taken and flip it.
        let states = [
            h.service
                .insert_or_flip_in(conn.as_ref(), "post1", SubjectType::Post, "alice", InteractionKind::Like)
                .await
                .unwrap(),
            h.service
                .insert_or_flip_in(conn.as_ref(), "post1", SubjectType::Post, "alice", InteractionKind::Like)
                .await
                .unwrap(),
            h.service
                .insert_or_flip_in(conn.as_ref(), "post1", SubjectType::Post, "alice", InteractionKind::Like)
                .await
                .unwrap(),
        ];

        assert_eq!(states, [true, false, true]);
        let repo = InteractionRepository::new(conn);
        assert_eq!(
            repo.count_records("post1", "alice", InteractionKind::Like).await.unwrap(),
            1
        );
        assert_eq!(repo.count_active("post1", InteractionKind::Like).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_toggle_missing_post() {
        let h = harness().await;

        let err = h.service.toggle_post_like("alice", "missing").await.unwrap_err();

        assert!(matches!(err, AppError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn test_rapid_second_toggle_is_rate_limited() {
        let h = harness_with(Arc::new(InMemoryInteractionGuard::new())).await;

        h.service.toggle_post_like("alice", "post1").await.unwrap();
        let err = h.service.toggle_post_like("alice", "post1").await.unwrap_err();

        assert!(matches!(err, AppError::RateLimited));
        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        assert_eq!(post.likes_count, 1);
    }

    #[tokio::test]
    async fn test_like_notifies_owner_only_on_activation() {
        let h = harness().await;

        h.service.toggle_post_like("alice", "post1").await.unwrap();
        h.service.toggle_post_like("alice", "post1").await.unwrap();

        let repo = NotificationRepository::new(h.db.connection());
        assert_eq!(repo.count_by_type("bob", NotificationType::Like).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_owner_liking_own_post_is_not_notified() {
        let h = harness().await;

        h.service.toggle_post_like("bob", "post1").await.unwrap();

        let repo = NotificationRepository::new(h.db.connection());
        assert_eq!(repo.count_unread("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_comment_like_publishes_to_post_room() {
        let h = harness().await;

        let result = h.service.toggle_comment_like("alice", "c1").await.unwrap();

        assert_eq!(result.count, 1);
        assert_eq!(
            h.events.names_for(&Room::Post("post1".to_string())).await,
            vec!["commentLikeUpdate"]
        );
        assert_eq!(
            h.events.names_for(&Room::User("bob".to_string())).await,
            vec!["notification"]
        );
        let comment = CommentRepository::new(h.db.connection()).get_by_id("c1").await.unwrap();
        assert_eq!(comment.likes_count, 1);
    }

    #[tokio::test]
    async fn test_comment_like_missing_comment() {
        let h = harness().await;

        let err = h.service.toggle_comment_like("alice", "nope").await.unwrap_err();

        assert!(matches!(err, AppError::CommentNotFound(_)));
    }

    #[tokio::test]
    async fn test_share_is_idempotent() {
        let h = harness().await;

        h.service.record_share("alice", "post1").await.unwrap();
        let again = h.service.record_share("alice", "post1").await.unwrap();

        assert_eq!(again.count, 1);
        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        assert_eq!(post.shares_count, 1);
    }

    #[tokio::test]
    async fn test_views_are_guarded() {
        let h = harness_with(Arc::new(InMemoryInteractionGuard::new())).await;
        let viewer = Viewer::User("alice".to_string());

        assert!(h.service.record_view("post1", &viewer).await.unwrap());
        assert!(!h.service.record_view("post1", &viewer).await.unwrap());
        assert!(
            h.service
                .record_view("post1", &Viewer::Anonymous("10.0.0.1".to_string()))
                .await
                .unwrap()
        );

        let post = PostRepository::new(h.db.connection()).get_by_id("post1").await.unwrap();
        assert_eq!(post.views_count, 2);
    }

    #[tokio::test]
    async fn test_activity_is_queued() {
        let mut h = harness().await;

        h.service.toggle_post_like("alice", "post1").await.unwrap();

        assert_eq!(h.jobs.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_counters_repairs_mirrors() {
        let h = harness().await;
        h.service.toggle_post_like("alice", "post1").await.unwrap();
        h.service.toggle_post_bookmark("alice", "post1").await.unwrap();

        let posts = PostRepository::new(h.db.connection());
        posts
            .set_counters(
                "post1",
                PostCounters {
                    likes: 42,
                    ..PostCounters::default()
                },
            )
            .await
            .unwrap();
        let users = UserRepository::new(h.db.connection());
        users.set_interaction_counts("alice", 7, 7).await.unwrap();

        let rebuilt = h.service.rebuild_post_counters("post1").await.unwrap();
        assert_eq!(
            rebuilt,
            PostCounters {
                likes: 1,
                bookmarks: 1,
                shares: 0,
                views: 0,
                comments: 1,
            }
        );
        assert_eq!(posts.get_by_id("post1").await.unwrap().likes_count, 1);

        let user = h.service.rebuild_user_counters("alice").await.unwrap();
        assert_eq!(
            user,
            UserCounters {
                liked_posts: 1,
                bookmarks: 1
            }
        );
    }
}
