//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    #[sea_orm(string_value = "new_follower")]
    NewFollower,
    #[sea_orm(string_value = "new_article_from_followed")]
    NewArticleFromFollowed,
    #[sea_orm(string_value = "article_sold")]
    ArticleSold,
    #[sea_orm(string_value = "article_liked")]
    ArticleLiked,
    #[sea_orm(string_value = "system")]
    System,
}

/// Key under which at-least-once duplicates collapse.
///
/// Rows without an entity reference fall back to their own id, so they never
/// collapse with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub entity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub notification_type: NotificationType,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// The user receiving the notification
    pub user_id: String,

    /// The user who caused it
    #[sea_orm(nullable)]
    pub actor_id: Option<String>,

    /// Polymorphic reference, e.g. an article id
    #[sea_orm(nullable)]
    pub entity_id: Option<String>,

    /// Kind of `entity_id`, e.g. "article" or "user"
    #[sea_orm(nullable)]
    pub entity_type: Option<String>,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    #[sea_orm(nullable)]
    pub read_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Deduplication key of this notification.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            user_id: self.user_id.clone(),
            notification_type: self.notification_type,
            entity: self.entity_id.clone().unwrap_or_else(|| self.id.clone()),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ActorId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Actor,
}

impl ActiveModelBehavior for ActiveModel {}
