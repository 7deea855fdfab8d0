//! Comment tree service.
//!
//! `parent_id` is the only link between a reply and its parent; the reply
//! lists returned by [`CommentService::thread`] are derived from it.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{
    entities::{comment, interaction::SubjectType, notification::NotificationType},
    repositories::{
        CommentRepository, InteractionRepository, NotificationRepository, PostRepository,
        UserRepository,
    },
};
use sea_orm::Set;
use serde::Serialize;
use tracing::{info, warn};

use crate::services::event_publisher::{
    CommentCreatedEvent, CommentDeletedEvent, EventPublisherService, Room, StreamEvent,
};
use crate::services::jobs::JobSender;
use crate::services::notification::{NotificationService, UserSummary};
use crate::services::{commit, rollback_conflict};

/// Longest accepted comment, in characters.
pub const MAX_CONTENT_LENGTH: usize = 10_000;

/// A comment with its author and, in threads, its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub user_id: String,
    pub author: Option<UserSummary>,
    pub content: String,
    pub is_reply: bool,
    pub likes_count: i32,
    pub replies_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    fn new(model: comment::Model, author: Option<UserSummary>) -> Self {
        Self {
            id: model.id,
            post_id: model.post_id,
            parent_id: model.parent_id,
            user_id: model.user_id,
            author,
            content: model.content,
            is_reply: model.is_reply,
            likes_count: model.likes_count,
            replies_count: model.replies_count,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.map(|t| t.with_timezone(&Utc)),
            replies: Vec::new(),
        }
    }
}

fn validate_content(content: &str) -> AppResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Comment content is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_CONTENT_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Comment content exceeds {MAX_CONTENT_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    user_repo: UserRepository,
    notification_service: NotificationService,
    event_publisher: Option<EventPublisherService>,
    job_sender: Option<JobSender>,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        user_repo: UserRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            comment_repo,
            post_repo,
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

    /// Set the job sender for mentions and audit records.
    pub fn set_job_sender(&mut self, job_sender: JobSender) {
        self.job_sender = Some(job_sender);
    }

    /// Create a comment on a post, or a reply when `parent_id` is set.
    pub async fn create(
        &self,
        post_id: &str,
        parent_id: Option<&str>,
        author_id: &str,
        content: &str,
    ) -> AppResult<CommentView> {
        let content = validate_content(content)?;
        let post = self.post_repo.get_by_id(post_id).await?;

        let parent = match parent_id {
            Some(id) => {
                let parent = self.comment_repo.get_by_id(id).await?;
                if parent.post_id != post_id {
                    return Err(AppError::BadRequest(format!(
                        "Comment {id} does not belong to post {post_id}"
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post_id.to_string()),
            user_id: Set(author_id.to_string()),
            parent_id: Set(parent_id.map(ToString::to_string)),
            content: Set(content),
            is_reply: Set(parent.is_some()),
            likes_count: Set(0),
            replies_count: Set(0),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let txn = self.comment_repo.begin().await?;
        if let Some(id) = parent_id {
            if CommentRepository::lock_in(&txn, id).await?.is_none() {
                if let Err(e) = txn.rollback().await {
                    warn!(error = %e, "Failed to roll back reply to a deleted comment");
                }
                return Err(AppError::CommentNotFound(id.to_string()));
            }
        }
        let created = CommentRepository::create_in(&txn, model).await?;

        // Attach to the parent's reply list or the post's comment list.
        let attached = match parent_id {
            Some(id) => CommentRepository::step_replies_count_in(&txn, id, true).await?,
            None => PostRepository::step_comments_count_in(&txn, post_id, true).await?,
        };
        if attached == 0 {
            return Err(rollback_conflict(txn, format!("comment {} not attached", created.id)).await);
        }
        commit(txn).await?;

        let author = self
            .user_repo
            .find_by_id(author_id)
            .await?
            .map(|u| UserSummary::from(&u));
        let author_name = author
            .as_ref()
            .map_or_else(|| "Someone".to_string(), |a| a.display_name().to_string());
        let view = CommentView::new(created, author);

        let event = CommentCreatedEvent {
            post_id: post_id.to_string(),
            parent_id: parent_id.map(ToString::to_string),
            comment: view.clone(),
            timestamp: Utc::now(),
        };
        let event = if parent.is_some() {
            StreamEvent::NewReply(event)
        } else {
            StreamEvent::NewComment(event)
        };
        self.publish(post_id, event).await;

        let (owner_id, notification_type, message) = match &parent {
            Some(parent) => (
                parent.user_id.as_str(),
                NotificationType::Reply,
                format!("{author_name} replied to your comment"),
            ),
            None => (
                post.user_id.as_str(),
                NotificationType::Comment,
                format!("{author_name} commented on your post \"{}\"", post.title),
            ),
        };
        if let Err(e) = self
            .notification_service
            .notify(
                owner_id,
                author_id,
                notification_type,
                &message,
                Some(post_id),
                Some(&view.id),
            )
            .await
        {
            warn!(comment_id = %view.id, error = %e, "Failed to notify owner");
        }

        if let Some(ref job_sender) = self.job_sender {
            job_sender.resolve_mentions(author_id, &view.content, post_id, &view.id);
            let action = if parent.is_some() { "reply" } else { "comment" };
            job_sender.record_activity(author_id, action, Some(&view.id), Some("comment"));
        }

        Ok(view)
    }

    /// Delete a comment and every reply below it.
    ///
    /// Only the author may delete. Returns the IDs of every removed comment,
    /// the requested one first.
    pub async fn delete(&self, comment_id: &str, requester_id: &str) -> AppResult<Vec<String>> {
        let target = self.comment_repo.get_by_id(comment_id).await?;
        if target.user_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the author can delete this comment".to_string(),
            ));
        }

        let txn = self.comment_repo.begin().await?;
        if CommentRepository::lock_in(&txn, comment_id).await?.is_none() {
            if let Err(e) = txn.rollback().await {
                warn!(error = %e, "Failed to roll back delete of a missing comment");
            }
            return Err(AppError::CommentNotFound(comment_id.to_string()));
        }

        let mut deleted = vec![target.id.clone()];
        let mut visited: HashSet<String> = HashSet::from([target.id.clone()]);
        let mut frontier = vec![target.id.clone()];
        while !frontier.is_empty() {
            let children = CommentRepository::find_child_ids_in(&txn, &frontier).await?;
            frontier = children
                .into_iter()
                .filter(|id| visited.insert(id.clone()))
                .collect();
            deleted.extend(frontier.iter().cloned());
        }

        InteractionRepository::delete_by_subjects_in(&txn, SubjectType::Comment, &deleted).await?;
        NotificationRepository::delete_by_comment_ids_in(&txn, &deleted).await?;
        CommentRepository::delete_many_in(&txn, &deleted).await?;

        // Detach from the parent. A parent that is already gone has nothing to detach.
        match target.parent_id.as_deref() {
            Some(parent_id) => {
                CommentRepository::step_replies_count_in(&txn, parent_id, false).await?;
            }
            None => {
                PostRepository::step_comments_count_in(&txn, &target.post_id, false).await?;
            }
        }
        commit(txn).await?;

        info!(comment_id = %comment_id, removed = deleted.len(), "Comment deleted");

        let event = CommentDeletedEvent {
            post_id: target.post_id.clone(),
            comment_id: target.id.clone(),
            parent_id: target.parent_id.clone(),
            deleted_ids: deleted.clone(),
            timestamp: Utc::now(),
        };
        let event = if target.parent_id.is_some() {
            StreamEvent::ReplyDeleted(event)
        } else {
            StreamEvent::CommentDeleted(event)
        };
        self.publish(&target.post_id, event).await;

        if let Some(ref job_sender) = self.job_sender {
            job_sender.record_activity(requester_id, "delete_comment", Some(comment_id), Some("comment"));
        }

        Ok(deleted)
    }

    /// Replace the content of a comment. Only the author may edit.
    pub async fn edit(
        &self,
        comment_id: &str,
        requester_id: &str,
        content: &str,
    ) -> AppResult<CommentView> {
        let content = validate_content(content)?;
        let existing = self.comment_repo.get_by_id(comment_id).await?;
        if existing.user_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the author can edit this comment".to_string(),
            ));
        }

        let updated = self.comment_repo.update_content(existing, content).await?;
        let author = self
            .user_repo
            .find_by_id(&updated.user_id)
            .await?
            .map(|u| UserSummary::from(&u));
        Ok(CommentView::new(updated, author))
    }

    /// Get a single comment without its replies.
    pub async fn get(&self, comment_id: &str) -> AppResult<CommentView> {
        let model = self.comment_repo.get_by_id(comment_id).await?;
        let author = self
            .user_repo
            .find_by_id(&model.user_id)
            .await?
            .map(|u| UserSummary::from(&u));
        Ok(CommentView::new(model, author))
    }

    /// Every comment on a post as a nested tree, oldest first at each level.
    pub async fn thread(&self, post_id: &str) -> AppResult<Vec<CommentView>> {
        self.post_repo.get_by_id(post_id).await?;
        let comments = self.comment_repo.find_by_post(post_id).await?;

        let mut author_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let authors: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&author_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect();

        Ok(build_tree(comments, &authors))
    }

    async fn publish(&self, post_id: &str, event: StreamEvent) {
        let Some(ref publisher) = self.event_publisher else {
            return;
        };
        let name = event.name();
        if let Err(e) = publisher.publish(Room::Post(post_id.to_string()), event).await {
            warn!(post_id = %post_id, event = name, error = %e, "Failed to publish comment event");
        }
    }
}

/// Nest `comments` (ordered oldest first) under their parents.
///
/// Comments whose parent is not in the list become roots. Cycles are never
/// reached from a root and are dropped.
fn build_tree(
    comments: Vec<comment::Model>,
    authors: &HashMap<String, UserSummary>,
) -> Vec<CommentView> {
    let ids: HashSet<String> = comments.iter().map(|c| c.id.clone()).collect();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots: Vec<String> = Vec::new();
    for c in &comments {
        match c.parent_id.as_ref() {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent.clone()).or_default().push(c.id.clone());
            }
            _ => roots.push(c.id.clone()),
        }
    }
    let root_set: HashSet<String> = roots.iter().cloned().collect();

    let mut nodes: HashMap<String, CommentView> = comments
        .into_iter()
        .map(|c| {
            let author = authors.get(&c.user_id).cloned();
            (c.id.clone(), CommentView::new(c, author))
        })
        .collect();

    // Breadth-first order puts every parent before its children.
    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = HashSet::new();
    let mut queue: VecDeque<String> = roots.into_iter().collect();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().cloned());
        }
        order.push(id);
    }

    // Walk backwards so each node is complete before it moves into its parent.
    let mut tree = Vec::new();
    for id in order.iter().rev() {
        let Some(mut node) = nodes.remove(id) else {
            continue;
        };
        node.replies.reverse();
        let parent = node.parent_id.clone().filter(|_| !root_set.contains(id));
        match parent.and_then(|p| nodes.get_mut(&p)) {
            Some(parent) => parent.replies.push(node),
            None => tree.push(node),
        }
    }
    tree.reverse();
    tree
}
