//! Article promotion entity.

use chrono::Duration;
use rewear_common::{AppError, AppResult};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of paid promotion attached to a listing.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionType {
    #[sea_orm(string_value = "boost")]
    Boost,
    #[sea_orm(string_value = "featured")]
    Featured,
    #[sea_orm(string_value = "top_of_category")]
    TopOfCategory,
}

/// Longest promotion window a listing may carry.
pub const MAX_DURATION_DAYS: i32 = 3650;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "article_promotion")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub article_id: String,

    pub promotion_type: PromotionType,

    pub duration_days: i32,

    #[sea_orm(default_value = false)]
    pub is_active: bool,

    /// Set on activation
    #[sea_orm(nullable)]
    pub start_date: Option<DateTimeWithTimeZone>,

    /// Always `start_date + duration_days` once active
    #[sea_orm(nullable)]
    pub end_date: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Start and end of the promotion window when activated at `now`.
    ///
    /// Fails with `Validation` when `duration_days` is outside
    /// `1..=MAX_DURATION_DAYS` or the end date is not representable.
    pub fn activation_window(
        &self,
        now: DateTimeWithTimeZone,
    ) -> AppResult<(DateTimeWithTimeZone, DateTimeWithTimeZone)> {
        let end = (1..=MAX_DURATION_DAYS)
            .contains(&self.duration_days)
            .then(|| now.checked_add_signed(Duration::days(i64::from(self.duration_days))))
            .flatten()
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "promotion {} has invalid duration_days {}",
                    self.id, self.duration_days
                ))
            })?;

        Ok((now, end))
    }

    /// Copy of this promotion activated at `now`.
    pub fn activated_at(&self, now: DateTimeWithTimeZone) -> AppResult<Self> {
        let (start, end) = self.activation_window(now)?;
        Ok(Self {
            is_active: true,
            start_date: Some(start),
            end_date: Some(end),
            ..self.clone()
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::article::Entity",
        from = "Column::ArticleId",
        to = "super::article::Column::Id",
        on_delete = "Cascade"
    )]
    Article,
}

impl Related<super::article::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Article.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn promotion(duration_days: i32) -> Model {
        Model {
            id: "p1".to_string(),
            article_id: "a1".to_string(),
            promotion_type: PromotionType::Featured,
            duration_days,
            is_active: false,
            start_date: None,
            end_date: None,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_activation_window_spans_duration() {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let (start, end) = promotion(14).activation_window(now).unwrap();

        assert_eq!(start, now);
        assert_eq!((end - start).num_days(), 14);
    }

    #[test]
    fn test_out_of_range_duration_is_rejected() {
        let now: DateTimeWithTimeZone = Utc::now().into();

        for days in [0, -3, MAX_DURATION_DAYS + 1, i32::MAX] {
            assert!(matches!(
                promotion(days).activation_window(now),
                Err(AppError::Validation(_))
            ));
        }
        assert!(promotion(MAX_DURATION_DAYS).activated_at(now).unwrap().is_active);
    }
}
