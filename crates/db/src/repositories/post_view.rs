//! Post view repository.

use std::sync::Arc;

use crate::entities::{PostView, post_view};
use chrono::{DateTime, FixedOffset, Utc};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect,
};

/// Post view repository for database operations.
#[derive(Clone)]
pub struct PostViewRepository {
    db: Arc<DatabaseConnection>,
}

impl PostViewRepository {
    /// Create a new post view repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append a view.
    pub async fn create(&self, model: post_view::ActiveModel) -> AppResult<post_view::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all views of a post.
    pub async fn count_by_post(&self, post_id: &str) -> AppResult<u64> {
        PostView::find()
            .filter(post_view::Column::PostId.eq(post_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count views of a post in `[start, end]`.
    pub async fn count_between(
        &self,
        post_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<u64> {
        PostView::find()
            .filter(post_view::Column::PostId.eq(post_id))
            .filter(post_view::Column::CreatedAt.gte(start.fixed_offset()))
            .filter(post_view::Column::CreatedAt.lte(end.fixed_offset()))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// View timestamps of a post since `since`.
    pub async fn times_since(
        &self,
        post_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let rows = PostView::find()
            .select_only()
            .column(post_view::Column::CreatedAt)
            .filter(post_view::Column::PostId.eq(post_id))
            .filter(post_view::Column::CreatedAt.gte(since.fixed_offset()))
            .into_tuple::<DateTime<FixedOffset>>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|t| t.with_timezone(&Utc)).collect())
    }

    /// Delete views created before `cutoff`.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = PostView::delete_many()
            .filter(post_view::Column::CreatedAt.lt(cutoff.fixed_offset()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_delete_older_than() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 12,
                }])
                .into_connection(),
        );

        let repo = PostViewRepository::new(db);
        let deleted = repo
            .delete_older_than(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();

        assert_eq!(deleted, 12);
    }
}
