//! Following repository.

use std::sync::Arc;

use async_trait::async_trait;
use rewear_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};

use crate::entities::{Following, following};
use crate::stores::SocialGraphStore;

/// Following repository for database operations.
#[derive(Clone)]
pub struct FollowingRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowingRepository {
    /// Create a new following repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn select_ids(
        &self,
        select: following::Column,
        filter: following::Column,
        user_id: &str,
    ) -> AppResult<Vec<String>> {
        Following::find()
            .select_only()
            .column(select)
            .filter(filter.eq(user_id))
            .order_by_asc(following::Column::CreatedAt)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

fn map_insert_err(e: DbErr) -> AppError {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
        return AppError::InvalidOperation("Already following this user".to_string());
    }
    AppError::Persistence(e.to_string())
}

#[async_trait]
impl SocialGraphStore for FollowingRepository {
    async fn list_follower_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.select_ids(
            following::Column::FollowerId,
            following::Column::FollowingId,
            user_id,
        )
        .await
    }

    async fn list_following_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.select_ids(
            following::Column::FollowingId,
            following::Column::FollowerId,
            user_id,
        )
        .await
    }

    async fn create_edge(&self, edge: following::Model) -> AppResult<following::Model> {
        following::ActiveModel {
            id: Set(edge.id),
            follower_id: Set(edge.follower_id),
            following_id: Set(edge.following_id),
            created_at: Set(edge.created_at),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(map_insert_err)
    }

    async fn delete_edge(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let result = Following::delete_many()
            .filter(following::Column::FollowerId.eq(follower_id))
            .filter(following::Column::FollowingId.eq(following_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn edge_exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let count = Following::find()
            .filter(following::Column::FollowerId.eq(follower_id))
            .filter(following::Column::FollowingId.eq(following_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        Ok(count > 0)
    }
}
