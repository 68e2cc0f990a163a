//! Article entity (a listing offered for sale).

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Listing lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArticleStatus {
    #[sea_orm(string_value = "pending_moderation")]
    PendingModeration,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "sold")]
    Sold,
}

impl ArticleStatus {
    /// Whether no further moderation transition is defined from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::PendingModeration)
    }
}

/// Ordered image URLs of a listing, stored as a JSON array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ImageList(pub Vec<String>);

impl From<Vec<String>> for ImageList {
    fn from(urls: Vec<String>) -> Self {
        Self(urls)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "article")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owner of the listing
    pub seller_id: String,

    pub category_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub images: ImageList,

    /// Price in minor currency units
    pub price: i64,

    pub status: ArticleStatus,

    /// Visible to buyers. Only ever true while `status` is `Approved`.
    #[sea_orm(default_value = false)]
    pub is_available: bool,

    #[sea_orm(column_type = "Text", nullable)]
    pub moderation_notes: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    /// Set once, when the listing is approved
    #[sea_orm(nullable)]
    pub published_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Image URLs in display order.
    #[must_use]
    pub fn image_urls(&self) -> &[String] {
        &self.images.0
    }

    /// `is_available` implies `Approved`.
    #[must_use]
    pub fn availability_is_consistent(&self) -> bool {
        !self.is_available || self.status == ArticleStatus::Approved
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SellerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Seller,

    #[sea_orm(has_many = "super::article_promotion::Entity")]
    Promotion,

    #[sea_orm(has_many = "super::moderation_log::Entity")]
    ModerationLog,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl Related<super::article_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Promotion.def()
    }
}

impl Related<super::moderation_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ModerationLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
