//! Notification preference repository.

use std::sync::Arc;

use crate::entities::{NotificationPreference, notification_preference};
use chrono::Utc;
use quill_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};

use super::write_err;

/// Notification preference repository for database operations.
#[derive(Clone)]
pub struct NotificationPreferenceRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationPreferenceRepository {
    /// Create a new notification preference repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user's preferences.
    pub async fn find(&self, user_id: &str) -> AppResult<Option<notification_preference::Model>> {
        NotificationPreference::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a user's preferences, creating the default row if none exists.
    ///
    /// Safe to race: the insert is a no-op when another request created the row.
    pub async fn get_or_create(&self, user_id: &str) -> AppResult<notification_preference::Model> {
        if let Some(prefs) = self.find(user_id).await? {
            return Ok(prefs);
        }

        NotificationPreference::insert(Self::defaults(user_id))
            .on_conflict(
                OnConflict::column(notification_preference::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(write_err)?;

        self.find(user_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("preferences for {user_id} vanished")))
    }

    /// Persist changed preference flags.
    pub async fn update(
        &self,
        mut model: notification_preference::ActiveModel,
    ) -> AppResult<notification_preference::Model> {
        model.updated_at = Set(Some(Utc::now().into()));
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Default preferences: in-app for everything, email for mentions and replies.
    #[must_use]
    pub fn defaults(user_id: &str) -> notification_preference::ActiveModel {
        notification_preference::ActiveModel {
            user_id: Set(user_id.to_string()),
            mentions_in_app: Set(true),
            mentions_email: Set(true),
            comments_in_app: Set(true),
            comments_email: Set(false),
            replies_in_app: Set(true),
            replies_email: Set(true),
            bookmarks_in_app: Set(true),
            bookmarks_email: Set(false),
            likes_in_app: Set(true),
            likes_email: Set(false),
            follows_in_app: Set(true),
            follows_email: Set(false),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
    }
}
