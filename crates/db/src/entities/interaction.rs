//! Interaction entity (likes, bookmarks and shares of posts and comments).
//!
//! At most one row exists per `(subject_id, actor_id, kind)`; toggling flips
//! `is_active` instead of inserting or deleting.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What an interaction points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "camelCase")]
pub enum SubjectType {
    #[sea_orm(string_value = "post")]
    Post,
    #[sea_orm(string_value = "comment")]
    Comment,
}

/// Interaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "camelCase")]
pub enum InteractionKind {
    #[sea_orm(string_value = "like")]
    Like,
    #[sea_orm(string_value = "bookmark")]
    Bookmark,
    #[sea_orm(string_value = "share")]
    Share,
}

impl InteractionKind {
    /// Action name reported to clients for the given resulting state.
    #[must_use]
    pub const fn action(self, is_active: bool) -> &'static str {
        match (self, is_active) {
            (Self::Like, true) => "like",
            (Self::Like, false) => "unlike",
            (Self::Bookmark, true) => "bookmark",
            (Self::Bookmark, false) => "unbookmark",
            (Self::Share, true) => "share",
            (Self::Share, false) => "unshare",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "interaction")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Post or comment ID
    pub subject_id: String,

    pub subject_type: SubjectType,

    /// The user who interacted
    pub actor_id: String,

    pub kind: InteractionKind,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ActorId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Actor,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Actor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
