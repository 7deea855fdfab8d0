//! Create notification preference table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let flag = |col: NotificationPreference, default: bool| {
            ColumnDef::new(col).boolean().not_null().default(default).to_owned()
        };

        manager
            .create_table(
                Table::create()
                    .table(NotificationPreference::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationPreference::UserId)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(flag(NotificationPreference::MentionsInApp, true))
                    .col(flag(NotificationPreference::MentionsEmail, true))
                    .col(flag(NotificationPreference::CommentsInApp, true))
                    .col(flag(NotificationPreference::CommentsEmail, false))
                    .col(flag(NotificationPreference::RepliesInApp, true))
                    .col(flag(NotificationPreference::RepliesEmail, true))
                    .col(flag(NotificationPreference::BookmarksInApp, true))
                    .col(flag(NotificationPreference::BookmarksEmail, false))
                    .col(flag(NotificationPreference::LikesInApp, true))
                    .col(flag(NotificationPreference::LikesEmail, false))
                    .col(flag(NotificationPreference::FollowsInApp, true))
                    .col(flag(NotificationPreference::FollowsEmail, false))
                    .col(
                        ColumnDef::new(NotificationPreference::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(NotificationPreference::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_preference_user")
                            .from(NotificationPreference::Table, NotificationPreference::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationPreference::Table).to_owned())
            .await
    }
}

#[derive(Iden, Clone, Copy)]
enum NotificationPreference {
    Table,
    UserId,
    MentionsInApp,
    MentionsEmail,
    CommentsInApp,
    CommentsEmail,
    RepliesInApp,
    RepliesEmail,
    BookmarksInApp,
    BookmarksEmail,
    LikesInApp,
    LikesEmail,
    FollowsInApp,
    FollowsEmail,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
