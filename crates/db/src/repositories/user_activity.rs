//! User activity repository.

use std::sync::Arc;

use crate::entities::{UserActivity, user_activity};
use chrono::{DateTime, Utc};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Serialize;

/// Number of audit records for one action.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct ActionCount {
    /// Action name.
    pub action: String,
    /// Records in the queried window.
    pub count: i64,
}

/// User activity repository for database operations.
#[derive(Clone)]
pub struct UserActivityRepository {
    db: Arc<DatabaseConnection>,
}

impl UserActivityRepository {
    /// Create a new user activity repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append an audit record.
    pub async fn create(
        &self,
        model: user_activity::ActiveModel,
    ) -> AppResult<user_activity::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count a user's records per action in `[start, end]`.
    pub async fn count_by_action(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<ActionCount>> {
        UserActivity::find()
            .select_only()
            .column(user_activity::Column::Action)
            .column_as(user_activity::Column::Id.count(), "count")
            .filter(user_activity::Column::UserId.eq(user_id))
            .filter(user_activity::Column::CreatedAt.gte(start.fixed_offset()))
            .filter(user_activity::Column::CreatedAt.lte(end.fixed_offset()))
            .group_by(user_activity::Column::Action)
            .order_by_asc(user_activity::Column::Action)
            .into_model::<ActionCount>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete records created before `cutoff`.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = UserActivity::delete_many()
            .filter(user_activity::Column::CreatedAt.lt(cutoff.fixed_offset()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
