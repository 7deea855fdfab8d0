//! Notification preference entity (one row per user).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::notification::NotificationType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_preference")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    pub mentions_in_app: bool,
    pub mentions_email: bool,
    pub comments_in_app: bool,
    pub comments_email: bool,
    pub replies_in_app: bool,
    pub replies_email: bool,
    pub bookmarks_in_app: bool,
    pub bookmarks_email: bool,
    pub likes_in_app: bool,
    pub likes_email: bool,
    pub follows_in_app: bool,
    pub follows_email: bool,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// `(in_app, email)` flags for a notification type.
    #[must_use]
    pub const fn channels(&self, notification_type: NotificationType) -> (bool, bool) {
        match notification_type {
            NotificationType::Mention => (self.mentions_in_app, self.mentions_email),
            NotificationType::Comment => (self.comments_in_app, self.comments_email),
            NotificationType::Reply => (self.replies_in_app, self.replies_email),
            NotificationType::Bookmark => (self.bookmarks_in_app, self.bookmarks_email),
            NotificationType::Like => (self.likes_in_app, self.likes_email),
            NotificationType::Follow => (self.follows_in_app, self.follows_email),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
