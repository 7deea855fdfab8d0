//! Test utilities for database operations.
//!
//! Provides an in-memory `SQLite` database with every migration applied, plus
//! fixture helpers for the rows most tests need.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::{
    entities::{comment, post, user},
    migrations::Migrator,
};

/// A migrated test database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: Arc<DatabaseConnection>,
}

impl TestDatabase {
    /// Create a fresh in-memory database and run migrations.
    ///
    /// The pool is pinned to a single connection: every `SQLite` memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        Migrator::up(&conn, None).await?;

        info!("Created in-memory test database");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.conn.clone()
    }

    /// Insert a user whose ID, username and token are derived from `id`.
    pub async fn insert_user(&self, id: &str) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            id: Set(id.to_string()),
            username: Set(id.to_string()),
            username_lower: Set(id.to_lowercase()),
            name: Set(None),
            avatar_url: Set(None),
            email: Set(Some(format!("{id}@example.com"))),
            locale: Set("en".to_string()),
            token: Set(Some(format!("token-{id}"))),
            is_admin: Set(false),
            followers_count: Set(0),
            following_count: Set(0),
            liked_posts_count: Set(0),
            bookmarks_count: Set(0),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.conn.as_ref())
        .await
    }

    /// Insert an admin user.
    pub async fn insert_admin(&self, id: &str) -> Result<user::Model, DbErr> {
        let admin = self.insert_user(id).await?;
        let mut active: user::ActiveModel = admin.into();
        active.is_admin = Set(true);
        active.update(self.conn.as_ref()).await
    }

    /// Insert a post with zeroed counters.
    pub async fn insert_post(&self, id: &str, author_id: &str) -> Result<post::Model, DbErr> {
        post::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(author_id.to_string()),
            title: Set(format!("Post {id}")),
            likes_count: Set(0),
            bookmarks_count: Set(0),
            shares_count: Set(0),
            views_count: Set(0),
            comments_count: Set(0),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.conn.as_ref())
        .await
    }

    /// Insert a comment directly, bypassing counter maintenance.
    pub async fn insert_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        parent_id: Option<&str>,
    ) -> Result<comment::Model, DbErr> {
        comment::ActiveModel {
            id: Set(id.to_string()),
            post_id: Set(post_id.to_string()),
            user_id: Set(author_id.to_string()),
            parent_id: Set(parent_id.map(ToString::to_string)),
            content: Set(format!("comment {id}")),
            is_reply: Set(parent_id.is_some()),
            likes_count: Set(0),
            replies_count: Set(0),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
        .insert(self.conn.as_ref())
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::{Post, User};
    use sea_orm::EntityTrait;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = TestDatabase::in_memory().await.unwrap();
        db.insert_user("alice").await.unwrap();
        db.insert_post("post1", "alice").await.unwrap();

        let user = User::find_by_id("alice").one(db.conn.as_ref()).await.unwrap();
        let post = Post::find_by_id("post1").one(db.conn.as_ref()).await.unwrap();

        assert_eq!(user.map(|u| u.token), Some(Some("token-alice".to_string())));
        assert_eq!(post.map(|p| p.user_id), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_each_database_is_isolated() {
        let first = TestDatabase::in_memory().await.unwrap();
        first.insert_user("alice").await.unwrap();

        let second = TestDatabase::in_memory().await.unwrap();
        let found = User::find_by_id("alice").one(second.conn.as_ref()).await.unwrap();

        assert!(found.is_none());
    }
}
