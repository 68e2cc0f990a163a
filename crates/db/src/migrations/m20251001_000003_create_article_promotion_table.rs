//! Create article promotion table migration.

use sea_orm_migration::prelude::*;

use crate::entities::article_promotion::MAX_DURATION_DAYS;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ArticlePromotion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ArticlePromotion::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ArticlePromotion::ArticleId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ArticlePromotion::PromotionType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ArticlePromotion::DurationDays)
                            .integer()
                            .not_null()
                            .check(
                                Expr::col(ArticlePromotion::DurationDays)
                                    .between(1, MAX_DURATION_DAYS),
                            ),
                    )
                    .col(
                        ColumnDef::new(ArticlePromotion::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ArticlePromotion::StartDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(ArticlePromotion::EndDate).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ArticlePromotion::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_article_promotion_article")
                            .from(ArticlePromotion::Table, ArticlePromotion::ArticleId)
                            .to(Article::Table, Article::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_article_promotion_article_id")
                    .table(ArticlePromotion::Table)
                    .col(ArticlePromotion::ArticleId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ArticlePromotion::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ArticlePromotion {
    Table,
    Id,
    ArticleId,
    PromotionType,
    DurationDays,
    IsActive,
    StartDate,
    EndDate,
    CreatedAt,
}

#[derive(Iden)]
enum Article {
    Table,
    Id,
}
