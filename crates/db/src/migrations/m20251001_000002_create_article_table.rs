//! Create article table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Article::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Article::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Article::SellerId).string_len(32).not_null())
                    .col(ColumnDef::new(Article::CategoryId).string_len(64).not_null())
                    .col(ColumnDef::new(Article::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Article::Description).text())
                    .col(
                        ColumnDef::new(Article::Images)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Article::Price).big_integer().not_null())
                    .col(
                        ColumnDef::new(Article::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending_moderation"),
                    )
                    .col(
                        ColumnDef::new(Article::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Article::ModerationNotes).text())
                    .col(ColumnDef::new(Article::RejectionReason).text())
                    .col(ColumnDef::new(Article::PublishedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Article::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Article::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_article_seller")
                            .from(Article::Table, Article::SellerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (status, created_at) for the oldest-first moderation queue
        manager
            .create_index(
                Index::create()
                    .name("idx_article_status_created_at")
                    .table(Article::Table)
                    .col(Article::Status)
                    .col(Article::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_article_seller_id")
                    .table(Article::Table)
                    .col(Article::SellerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Article::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Article {
    Table,
    Id,
    SellerId,
    CategoryId,
    Title,
    Description,
    Images,
    Price,
    Status,
    IsAvailable,
    ModerationNotes,
    RejectionReason,
    PublishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
