//! Article repository.

use std::sync::Arc;

use async_trait::async_trait;
use rewear_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait, prelude::DateTimeWithTimeZone,
};

use crate::entities::{
    Article, ArticlePromotion, ModerationLog,
    article::{self, ArticleStatus},
    article_promotion, moderation_log,
};
use crate::stores::{ListingStore, ListingTransaction, StatusUpdate};

fn db_err(e: sea_orm::DbErr) -> AppError {
    AppError::Persistence(e.to_string())
}

/// Article repository for database operations.
#[derive(Clone)]
pub struct ArticleRepository {
    db: Arc<DatabaseConnection>,
}

impl ArticleRepository {
    /// Create a new article repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingStore for ArticleRepository {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<article::Model>> {
        Article::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_pending(&self, limit: u64, offset: u64) -> AppResult<Vec<article::Model>> {
        Article::find()
            .filter(article::Column::Status.eq(ArticleStatus::PendingModeration))
            .order_by_asc(article::Column::CreatedAt)
            .order_by_asc(article::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_moderation_logs(
        &self,
        article_id: &str,
    ) -> AppResult<Vec<moderation_log::Model>> {
        ModerationLog::find()
            .filter(moderation_log::Column::ArticleId.eq(article_id))
            .order_by_asc(moderation_log::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_promotions_by_article(
        &self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>> {
        ArticlePromotion::find()
            .filter(article_promotion::Column::ArticleId.eq(article_id))
            .order_by_asc(article_promotion::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn mark_sold(
        &self,
        id: &str,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Option<article::Model>> {
        let result = Article::update_many()
            .set(article::ActiveModel {
                status: Set(ArticleStatus::Sold),
                is_available: Set(false),
                updated_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(article::Column::Id.eq(id))
            .filter(article::Column::Status.eq(ArticleStatus::Approved))
            .filter(article::Column::IsAvailable.eq(true))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    async fn begin(&self) -> AppResult<Box<dyn ListingTransaction>> {
        let txn = self.db.begin().await.map_err(db_err)?;
        Ok(Box::new(ArticleTransaction { txn }))
    }
}

/// Listing unit of work backed by a database transaction.
///
/// `SeaORM` rolls the transaction back when it is dropped uncommitted.
pub struct ArticleTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl ListingTransaction for ArticleTransaction {
    async fn get_by_id(&mut self, id: &str) -> AppResult<Option<article::Model>> {
        Article::find_by_id(id).one(&self.txn).await.map_err(db_err)
    }

    async fn update_status(&mut self, id: &str, update: StatusUpdate) -> AppResult<bool> {
        let result = Article::update_many()
            .set(article::ActiveModel {
                status: Set(update.status),
                is_available: Set(update.is_available),
                published_at: Set(update.published_at),
                moderation_notes: Set(update.moderation_notes),
                rejection_reason: Set(update.rejection_reason),
                updated_at: Set(Some(update.updated_at)),
                ..Default::default()
            })
            .filter(article::Column::Id.eq(id))
            .filter(article::Column::Status.eq(ArticleStatus::PendingModeration))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected == 1)
    }

    async fn list_promotions_by_article(
        &mut self,
        article_id: &str,
    ) -> AppResult<Vec<article_promotion::Model>> {
        ArticlePromotion::find()
            .filter(article_promotion::Column::ArticleId.eq(article_id))
            .order_by_asc(article_promotion::Column::CreatedAt)
            .all(&self.txn)
            .await
            .map_err(db_err)
    }

    async fn activate_promotions(
        &mut self,
        promotions: &[article_promotion::Model],
        now: DateTimeWithTimeZone,
    ) -> AppResult<Vec<article_promotion::Model>> {
        let mut activated = Vec::with_capacity(promotions.len());

        for promotion in promotions {
            let (start, end) = promotion.activation_window(now)?;
            let model = article_promotion::ActiveModel {
                id: Unchanged(promotion.id.clone()),
                is_active: Set(true),
                start_date: Set(Some(start)),
                end_date: Set(Some(end)),
                ..Default::default()
            };
            activated.push(model.update(&self.txn).await.map_err(db_err)?);
        }

        Ok(activated)
    }

    async fn insert_moderation_log(
        &mut self,
        log: moderation_log::Model,
    ) -> AppResult<moderation_log::Model> {
        moderation_log::ActiveModel {
            id: Set(log.id),
            article_id: Set(log.article_id),
            moderator_id: Set(log.moderator_id),
            action: Set(log.action),
            notes: Set(log.notes),
            created_at: Set(log.created_at),
        }
        .insert(&self.txn)
        .await
        .map_err(db_err)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.txn.commit().await.map_err(db_err)
    }
}
