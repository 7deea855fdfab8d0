//! Post repository.

use std::sync::Arc;

use crate::entities::{Post, interaction::InteractionKind, post};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;

use super::{step_counter, write_err};

/// Recomputed values for every post counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostCounters {
    /// Active likes.
    pub likes: i32,
    /// Active bookmarks.
    pub bookmarks: i32,
    /// Distinct sharers.
    pub shares: i32,
    /// Logged views.
    pub views: i32,
    /// Top-level comments.
    pub comments: i32,
}

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Self::find_by_id_in(self.db.as_ref(), id).await
    }

    /// Find a post by ID on the given connection.
    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a post by ID, returning `PostNotFound` if missing.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.insert(self.db.as_ref()).await.map_err(write_err)
    }

    /// Step the counter mirroring an interaction kind by one.
    ///
    /// Returns the number of rows changed so callers can detect a vanished post.
    pub async fn step_interaction_count_in<C: ConnectionTrait>(
        conn: &C,
        post_id: &str,
        kind: InteractionKind,
        up: bool,
    ) -> AppResult<u64> {
        let column = match kind {
            InteractionKind::Like => post::Column::LikesCount,
            InteractionKind::Bookmark => post::Column::BookmarksCount,
            InteractionKind::Share => post::Column::SharesCount,
        };
        Self::step_in(conn, post_id, column, up).await
    }

    /// Step the top-level comment counter by one.
    pub async fn step_comments_count_in<C: ConnectionTrait>(
        conn: &C,
        post_id: &str,
        up: bool,
    ) -> AppResult<u64> {
        Self::step_in(conn, post_id, post::Column::CommentsCount, up).await
    }

    /// Increment the view counter (single UPDATE query, no fetch).
    pub async fn increment_views_count(&self, post_id: &str) -> AppResult<u64> {
        Self::step_in(self.db.as_ref(), post_id, post::Column::ViewsCount, true).await
    }

    async fn step_in<C: ConnectionTrait>(
        conn: &C,
        post_id: &str,
        column: post::Column,
        up: bool,
    ) -> AppResult<u64> {
        let result = Post::update_many()
            .col_expr(column, step_counter(column, up))
            .filter(post::Column::Id.eq(post_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Overwrite every counter with recomputed values.
    pub async fn set_counters(&self, post_id: &str, counters: PostCounters) -> AppResult<()> {
        Post::update_many()
            .col_expr(post::Column::LikesCount, counters.likes.into())
            .col_expr(post::Column::BookmarksCount, counters.bookmarks.into())
            .col_expr(post::Column::SharesCount, counters.shares.into())
            .col_expr(post::Column::ViewsCount, counters.views.into())
            .col_expr(post::Column::CommentsCount, counters.comments.into())
            .filter(post::Column::Id.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_post(id: &str, user_id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: "Hello".to_string(),
            likes_count: 3,
            bookmarks_count: 1,
            shares_count: 0,
            views_count: 10,
            comments_count: 2,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let err = repo.get_by_id("missing").await.unwrap_err();

        assert!(matches!(err, AppError::PostNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let post = create_test_post("post1", "user1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let found = repo.find_by_id("post1").await.unwrap().unwrap();

        assert_eq!(found.likes_count, 3);
    }

    #[tokio::test]
    async fn test_step_reports_zero_rows_for_missing_post() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let rows =
            PostRepository::step_interaction_count_in(&db, "gone", InteractionKind::Like, true)
                .await
                .unwrap();

        assert_eq!(rows, 0);
    }

    #[test]
    fn test_decrement_is_floored() {
        use sea_orm::sea_query::{PostgresQueryBuilder, Query};

        let sql = Query::update()
            .table(Post)
            .value(
                post::Column::LikesCount,
                step_counter(post::Column::LikesCount, false),
            )
            .to_string(PostgresQueryBuilder);

        assert!(sql.contains("CASE WHEN likes_count > 0 THEN likes_count - 1 ELSE 0 END"));
    }
}
