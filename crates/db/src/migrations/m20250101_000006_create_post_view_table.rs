//! Create post view table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PostView::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PostView::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(PostView::PostId).string_len(32).not_null())
                    .col(ColumnDef::new(PostView::ViewerId).string_len(32))
                    .col(ColumnDef::new(PostView::IpAddress).string_len(64))
                    .col(
                        ColumnDef::new(PostView::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_view_post")
                            .from(PostView::Table, PostView::PostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (post_id, created_at) (for analytics ranges)
        manager
            .create_index(
                Index::create()
                    .name("idx_post_view_post_id_created_at")
                    .table(PostView::Table)
                    .col(PostView::PostId)
                    .col(PostView::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for cleanup)
        manager
            .create_index(
                Index::create()
                    .name("idx_post_view_created_at")
                    .table(PostView::Table)
                    .col(PostView::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PostView::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PostView {
    Table,
    Id,
    PostId,
    ViewerId,
    IpAddress,
    CreatedAt,
}

#[derive(Iden)]
enum Post {
    Table,
    Id,
}
