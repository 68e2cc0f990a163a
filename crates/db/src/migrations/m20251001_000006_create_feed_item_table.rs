//! Create feed item table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FeedItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeedItem::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FeedItem::ItemType).string_len(32).not_null())
                    .col(ColumnDef::new(FeedItem::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(FeedItem::ArticleId).string_len(32))
                    .col(ColumnDef::new(FeedItem::Content).text())
                    .col(
                        ColumnDef::new(FeedItem::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feed_item_user")
                            .from(FeedItem::Table, FeedItem::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, created_at) for timelines built from follow edges
        manager
            .create_index(
                Index::create()
                    .name("idx_feed_item_user_id_created_at")
                    .table(FeedItem::Table)
                    .col(FeedItem::UserId)
                    .col(FeedItem::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feed_item_created_at")
                    .table(FeedItem::Table)
                    .col(FeedItem::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeedItem::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum FeedItem {
    Table,
    Id,
    ItemType,
    UserId,
    ArticleId,
    Content,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
