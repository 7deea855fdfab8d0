//! Create user activity table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserActivity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserActivity::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserActivity::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(UserActivity::Action).string_len(32).not_null())
                    .col(ColumnDef::new(UserActivity::SubjectId).string_len(32))
                    .col(ColumnDef::new(UserActivity::SubjectType).string_len(16))
                    .col(
                        ColumnDef::new(UserActivity::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_activity_user")
                            .from(UserActivity::Table, UserActivity::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, created_at) (for activity summaries)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_activity_user_id_created_at")
                    .table(UserActivity::Table)
                    .col(UserActivity::UserId)
                    .col(UserActivity::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for cleanup)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_activity_created_at")
                    .table(UserActivity::Table)
                    .col(UserActivity::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserActivity::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserActivity {
    Table,
    Id,
    UserId,
    Action,
    SubjectId,
    SubjectType,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
