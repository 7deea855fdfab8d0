//! User repository.

use std::sync::Arc;

use crate::entities::{User, interaction::InteractionKind, user};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

use super::{step_counter, write_err};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a user by ID, returning `UserNotFound` if missing.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find a user by access token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find users by ID in one query.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Resolve usernames (case-insensitive) in one query.
    pub async fn find_by_usernames(&self, usernames: &[String]) -> AppResult<Vec<user::Model>> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        User::find()
            .filter(
                user::Column::UsernameLower.is_in(usernames.iter().map(|u| u.to_lowercase())),
            )
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.insert(self.db.as_ref()).await.map_err(write_err)
    }

    /// Step the per-user mirror of a post interaction kind by one.
    ///
    /// Only likes and bookmarks are mirrored on the user; other kinds report one
    /// changed row so callers treat them as applied.
    pub async fn step_interaction_count_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        kind: InteractionKind,
        up: bool,
    ) -> AppResult<u64> {
        let column = match kind {
            InteractionKind::Like => user::Column::LikedPostsCount,
            InteractionKind::Bookmark => user::Column::BookmarksCount,
            InteractionKind::Share => return Ok(1),
        };
        Self::step_in(conn, user_id, column, up).await
    }

    /// Step followers count by one.
    pub async fn step_followers_count_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        up: bool,
    ) -> AppResult<u64> {
        Self::step_in(conn, user_id, user::Column::FollowersCount, up).await
    }

    /// Step following count by one.
    pub async fn step_following_count_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        up: bool,
    ) -> AppResult<u64> {
        Self::step_in(conn, user_id, user::Column::FollowingCount, up).await
    }

    async fn step_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        column: user::Column,
        up: bool,
    ) -> AppResult<u64> {
        let result = User::update_many()
            .col_expr(column, step_counter(column, up))
            .filter(user::Column::Id.eq(user_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Overwrite the interaction mirrors with recomputed values.
    pub async fn set_interaction_counts(
        &self,
        user_id: &str,
        liked_posts: i32,
        bookmarks: i32,
    ) -> AppResult<()> {
        User::update_many()
            .col_expr(user::Column::LikedPostsCount, liked_posts.into())
            .col_expr(user::Column::BookmarksCount, bookmarks.into())
            .filter(user::Column::Id.eq(user_id))
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
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_user(id: &str, username: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            username_lower: username.to_lowercase(),
            name: None,
            avatar_url: None,
            email: None,
            locale: "en".to_string(),
            token: Some(format!("token-{id}")),
            is_admin: false,
            followers_count: 0,
            following_count: 0,
            liked_posts_count: 0,
            bookmarks_count: 0,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_token() {
        let user = create_test_user("user1", "alice");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo.find_by_token("token-user1").await.unwrap();

        assert_eq!(found.map(|u| u.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let err = repo.get_by_id("ghost").await.unwrap_err();

        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_by_usernames() {
        let alice = create_test_user("user1", "Alice");
        let bob = create_test_user("user2", "bob");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[alice, bob]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo
            .find_by_usernames(&["ALICE".to_string(), "bob".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_share_is_not_mirrored() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let rows =
            UserRepository::step_interaction_count_in(&db, "user1", InteractionKind::Share, true)
                .await
                .unwrap();

        assert_eq!(rows, 1);
    }
}
