//! Notification and feed repository.

use std::sync::Arc;

use async_trait::async_trait;
use rewear_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    prelude::DateTimeWithTimeZone, sea_query::OnConflict,
};

use crate::entities::{FeedItem, Notification, feed_item, notification};
use crate::stores::NotificationStore;

fn db_err(e: sea_orm::DbErr) -> AppError {
    AppError::Persistence(e.to_string())
}

fn to_active(model: notification::Model) -> notification::ActiveModel {
    notification::ActiveModel {
        id: Set(model.id),
        notification_type: Set(model.notification_type),
        title: Set(model.title),
        message: Set(model.message),
        user_id: Set(model.user_id),
        actor_id: Set(model.actor_id),
        entity_id: Set(model.entity_id),
        entity_type: Set(model.entity_type),
        is_read: Set(model.is_read),
        read_at: Set(model.read_at),
        created_at: Set(model.created_at),
    }
}

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn insert_feed_item(&self, item: feed_item::Model) -> AppResult<feed_item::Model> {
        feed_item::ActiveModel {
            id: Set(item.id),
            item_type: Set(item.item_type),
            user_id: Set(item.user_id),
            article_id: Set(item.article_id),
            content: Set(item.content),
            created_at: Set(item.created_at),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_err)
    }

    async fn insert_notifications_batch(
        &self,
        batch: Vec<notification::Model>,
    ) -> AppResult<u64> {
        // insert_many rejects an empty set
        if batch.is_empty() {
            return Ok(0);
        }

        // A retried batch reuses its row ids; rows that already landed are skipped
        Notification::insert_many(batch.into_iter().map(to_active))
            .on_conflict(
                OnConflict::column(notification::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        Notification::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        // Newest row per dedup key, then paged
        let sql = r"
            SELECT * FROM (
                SELECT DISTINCT ON (notification_type, COALESCE(entity_id, id)) *
                FROM notification
                WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
                ORDER BY notification_type, COALESCE(entity_id, id), created_at DESC, id DESC
            ) AS latest
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
        ";

        Notification::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                [
                    user_id.into(),
                    unread_only.into(),
                    i64::try_from(limit).unwrap_or(i64::MAX).into(),
                    i64::try_from(offset).unwrap_or(i64::MAX).into(),
                ],
            ))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        let sql = r"
            SELECT COUNT(*) AS count FROM (
                SELECT DISTINCT notification_type, COALESCE(entity_id, id)
                FROM notification
                WHERE user_id = $1 AND is_read = FALSE
            ) AS unread
        ";

        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                [user_id.into()],
            ))
            .await
            .map_err(db_err)?;

        let count = match row {
            Some(row) => row.try_get::<i64>("", "count").map_err(db_err)?,
            None => 0,
        };

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn mark_read(
        &self,
        notification: &notification::Model,
        now: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let mut query = Notification::update_many()
            .set(notification::ActiveModel {
                is_read: Set(true),
                read_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(notification::Column::UserId.eq(&notification.user_id))
            .filter(notification::Column::NotificationType.eq(notification.notification_type))
            .filter(notification::Column::IsRead.eq(false));

        query = match &notification.entity_id {
            Some(entity_id) => query.filter(notification::Column::EntityId.eq(entity_id)),
            None => query.filter(notification::Column::Id.eq(&notification.id)),
        };

        let result = query.exec(self.db.as_ref()).await.map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn mark_all_read(&self, user_id: &str, now: DateTimeWithTimeZone) -> AppResult<u64> {
        let result = Notification::update_many()
            .set(notification::ActiveModel {
                is_read: Set(true),
                read_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn list_feed_items(
        &self,
        actor_ids: &[String],
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<feed_item::Model>> {
        if actor_ids.is_empty() {
            return Ok(vec![]);
        }

        FeedItem::find()
            .filter(feed_item::Column::UserId.is_in(actor_ids.iter().cloned()))
            .order_by_desc(feed_item::Column::CreatedAt)
            .order_by_desc(feed_item::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    async fn delete_feed_items_before(&self, cutoff: DateTimeWithTimeZone) -> AppResult<u64> {
        let result = FeedItem::delete_many()
            .filter(feed_item::Column::CreatedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn delete_read_notifications_before(
        &self,
        cutoff: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = Notification::delete_many()
            .filter(notification::Column::IsRead.eq(true))
            .filter(notification::Column::CreatedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::notification::NotificationType;
    use chrono::Utc;
    use sea_orm::{MockDatabase, MockExecResult};
    use std::collections::BTreeMap;

    fn create_test_notification(id: &str, user_id: &str, entity: Option<&str>) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            notification_type: NotificationType::NewArticleFromFollowed,
            title: "New article".to_string(),
            message: "A seller you follow published an article".to_string(),
            user_id: user_id.to_string(),
            actor_id: Some("seller1".to_string()),
            entity_id: entity.map(str::to_string),
            entity_type: entity.map(|_| "article".to_string()),
            is_read: false,
            read_at: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_list_notifications_collapses_in_query() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![create_test_notification("n2", "u1", Some("a1"))]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db.clone());
        let rows = repo.list_notifications("u1", 20, 0, false).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "n2");

        drop(repo);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        let sql = format!("{log:?}");
        assert!(sql.contains("DISTINCT ON"));
        assert!(sql.contains("LIMIT $3 OFFSET $4"));
    }

    #[tokio::test]
    async fn test_insert_empty_batch_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = NotificationRepository::new(db);
        let written = repo.insert_notifications_batch(vec![]).await.unwrap();

        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_insert_batch() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let written = repo
            .insert_notifications_batch(vec![
                create_test_notification("n1", "u1", Some("a1")),
                create_test_notification("n2", "u2", Some("a1")),
            ])
            .await
            .unwrap();

        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_count_unread() {
        let row = BTreeMap::from([("count", sea_orm::Value::BigInt(Some(3)))]);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let count = repo.count_unread("u1").await.unwrap();

        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_mark_read_collapses_duplicates() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let updated = repo
            .mark_read(
                &create_test_notification("n1", "u1", Some("a1")),
                Utc::now().into(),
            )
            .await
            .unwrap();

        assert_eq!(updated, 2);
    }

    #[tokio::test]
    async fn test_list_feed_items_without_actors() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = NotificationRepository::new(db);
        let items = repo.list_feed_items(&[], 20, 0).await.unwrap();

        assert!(items.is_empty());
    }
}
