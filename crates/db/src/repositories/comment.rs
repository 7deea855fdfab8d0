//! Comment repository.

use std::sync::Arc;

use crate::entities::{Comment, comment};
use chrono::Utc;
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::{step_counter, write_err};

/// Comment repository for database operations.
#[derive(Clone)]
pub struct CommentRepository {
    db: Arc<DatabaseConnection>,
}

impl CommentRepository {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Start a transaction on the underlying pool.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a comment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<comment::Model>> {
        Self::find_by_id_in(self.db.as_ref(), id).await
    }

    /// Find a comment by ID on the given connection.
    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a comment and hold its row lock until the transaction ends.
    ///
    /// Replies lock their parent and deletes lock their target, so the two
    /// never interleave on the same row.
    pub async fn lock_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<comment::Model>> {
        Comment::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a comment by ID, returning `CommentNotFound` if missing.
    pub async fn get_by_id(&self, id: &str) -> AppResult<comment::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CommentNotFound(id.to_string()))
    }

    /// Insert a comment on the given connection.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: comment::ActiveModel,
    ) -> AppResult<comment::Model> {
        model.insert(conn).await.map_err(write_err)
    }

    /// Every comment on a post, oldest first.
    pub async fn find_by_post(&self, post_id: &str) -> AppResult<Vec<comment::Model>> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count top-level comments on a post.
    pub async fn count_top_level(&self, post_id: &str) -> AppResult<u64> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .filter(comment::Column::ParentId.is_null())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of the direct children of any of the given comments.
    pub async fn find_child_ids_in<C: ConnectionTrait>(
        conn: &C,
        parent_ids: &[String],
    ) -> AppResult<Vec<String>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        Comment::find()
            .select_only()
            .column(comment::Column::Id)
            .filter(comment::Column::ParentId.is_in(parent_ids.iter().cloned()))
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete comments by ID in one statement.
    pub async fn delete_many_in<C: ConnectionTrait>(conn: &C, ids: &[String]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = Comment::delete_many()
            .filter(comment::Column::Id.is_in(ids.iter().cloned()))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Step the direct-replies counter by one.
    pub async fn step_replies_count_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        up: bool,
    ) -> AppResult<u64> {
        Self::step_in(conn, comment_id, comment::Column::RepliesCount, up).await
    }

    /// Step the likes counter by one.
    pub async fn step_likes_count_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        up: bool,
    ) -> AppResult<u64> {
        Self::step_in(conn, comment_id, comment::Column::LikesCount, up).await
    }

    async fn step_in<C: ConnectionTrait>(
        conn: &C,
        comment_id: &str,
        column: comment::Column,
        up: bool,
    ) -> AppResult<u64> {
        let result = Comment::update_many()
            .col_expr(column, step_counter(column, up))
            .filter(comment::Column::Id.eq(comment_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Replace the content of a comment.
    pub async fn update_content(
        &self,
        comment: comment::Model,
        content: String,
    ) -> AppResult<comment::Model> {
        let mut active: comment::ActiveModel = comment.into();
        active.content = Set(content);
        active.updated_at = Set(Some(Utc::now().into()));
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
