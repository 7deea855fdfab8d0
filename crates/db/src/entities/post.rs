//! Post entity.
//!
//! Only the columns the interaction engine touches live here; post bodies,
//! categories and topics are owned by the CMS side.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "post")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Author
    pub user_id: String,

    pub title: String,

    /// Active likes (mirror of the interaction table)
    #[sea_orm(default_value = 0)]
    pub likes_count: i32,

    /// Active bookmarks (mirror of the interaction table)
    #[sea_orm(default_value = 0)]
    pub bookmarks_count: i32,

    /// Distinct sharers
    #[sea_orm(default_value = 0)]
    pub shares_count: i32,

    /// Accepted views
    #[sea_orm(default_value = 0)]
    pub views_count: i32,

    /// Top-level comments
    #[sea_orm(default_value = 0)]
    pub comments_count: i32,

    pub created_at: DateTimeWithTimeZone,
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

    #[sea_orm(has_many = "super::comment::Entity")]
    Comments,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
