//! Create interaction table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Interaction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Interaction::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Interaction::SubjectId).string_len(32).not_null())
                    .col(ColumnDef::new(Interaction::SubjectType).string_len(16).not_null())
                    .col(ColumnDef::new(Interaction::ActorId).string_len(32).not_null())
                    .col(ColumnDef::new(Interaction::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Interaction::IsActive).boolean().not_null().default(true))
                    .col(
                        ColumnDef::new(Interaction::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Interaction::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interaction_actor")
                            .from(Interaction::Table, Interaction::ActorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (subject_id, actor_id, kind) - one record per pair and kind
        manager
            .create_index(
                Index::create()
                    .name("idx_interaction_subject_actor_kind")
                    .table(Interaction::Table)
                    .col(Interaction::SubjectId)
                    .col(Interaction::ActorId)
                    .col(Interaction::Kind)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (actor_id, kind) (for per-user counters and status lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_interaction_actor_kind")
                    .table(Interaction::Table)
                    .col(Interaction::ActorId)
                    .col(Interaction::Kind)
                    .to_owned(),
            )
            .await?;

        // Index: updated_at (for analytics ranges)
        manager
            .create_index(
                Index::create()
                    .name("idx_interaction_updated_at")
                    .table(Interaction::Table)
                    .col(Interaction::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Interaction::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Interaction {
    Table,
    Id,
    SubjectId,
    SubjectType,
    ActorId,
    Kind,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
