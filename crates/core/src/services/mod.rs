//! Business logic services.

#![allow(missing_docs)]

pub mod analytics;
pub mod comment;
pub mod email;
pub mod event_publisher;
pub mod following;
pub mod interaction;
pub mod interaction_guard;
pub mod jobs;
pub mod notification;

pub use analytics::{ActivitySummary, AnalyticsService, DailyAnalytics, DailyCount, PostAnalytics};
pub use comment::{CommentService, CommentView};
pub use email::{
    EmailMessage, EmailSender, EmailService, Locale, LogEmailSender, NotificationEmail,
    SmtpEmailSender,
};
pub use event_publisher::{
    DedupEventPublisher, EventPublisher, EventPublisherService, NoOpEventPublisher, Room,
    StreamEvent,
};
pub use following::{FollowResult, FollowingService};
pub use interaction::{InteractionService, ToggleResult, UserCounters};
pub use interaction_guard::{
    InMemoryInteractionGuard, InteractionGuard, InteractionGuardService, RedisInteractionGuard,
    Viewer,
};
pub use jobs::{Job, JobSender, JobService, JobWorkerContext};
pub use notification::{
    NotificationPreferences, NotificationPreferencesUpdate, NotificationService,
    NotificationView, UserSummary,
};

use quill_common::{AppError, AppResult};
use sea_orm::DatabaseTransaction;
use tracing::error;

/// Commit a write transaction. A failed commit is reported as a conflict.
pub(crate) async fn commit(txn: DatabaseTransaction) -> AppResult<()> {
    txn.commit()
        .await
        .map_err(|e| AppError::Conflict(format!("commit failed: {e}")))
}

/// Roll back after a write touched no rows and build the conflict to return.
pub(crate) async fn rollback_conflict(txn: DatabaseTransaction, reason: String) -> AppError {
    match txn.rollback().await {
        Ok(()) => AppError::Conflict(reason),
        Err(e) => {
            error!(error = %e, reason = %reason, "Rollback failed");
            AppError::Database(e.to_string())
        }
    }
}
