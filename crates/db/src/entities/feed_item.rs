//! Feed item entity.
//!
//! One row per published event. Followers see it by joining their follow
//! edges against `user_id`, so nothing here is per-recipient.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Feed item types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedItemType {
    #[sea_orm(string_value = "new_article")]
    NewArticle,
    #[sea_orm(string_value = "article_sold")]
    ArticleSold,
    #[sea_orm(string_value = "profile_update")]
    ProfileUpdate,
    #[sea_orm(string_value = "achievement")]
    Achievement,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "feed_item")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub item_type: FeedItemType,

    /// The actor who generated the event (not the recipient)
    pub user_id: String,

    #[sea_orm(nullable)]
    pub article_id: Option<String>,

    /// Free text for non-article events
    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl ActiveModelBehavior for ActiveModel {}
