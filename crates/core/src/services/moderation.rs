//! Moderation service: the listing moderation state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rewear_common::{AppError, AppResult, IdGenerator};
use rewear_db::{
    entities::{
        article::{self, ArticleStatus},
        article_promotion,
        moderation_log::{self, ModerationAction},
    },
    stores::{ListingStore, StatusUpdate},
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::pagination::PageRequest;
use crate::policy::{Action, Actor, authorize};
use crate::services::fan_out::{FanOutEvent, FanOutQueue};

/// Input for a moderation decision.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionInput {
    #[validate(length(min = 1, max = 32))]
    pub article_id: String,
    pub action: ModerationAction,
    #[validate(length(max = 2048))]
    pub notes: Option<String>,
    #[validate(length(max = 2048))]
    pub rejection_reason: Option<String>,
}

/// Committed outcome of a decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub article: article::Model,
    pub log: moderation_log::Model,
    pub activated_promotions: Vec<article_promotion::Model>,
}

/// Moderation service.
#[derive(Clone)]
pub struct ModerationService {
    listings: Arc<dyn ListingStore>,
    fan_out: Option<Arc<dyn FanOutQueue>>,
    transaction_timeout: Duration,
    id_gen: IdGenerator,
}

impl ModerationService {
    /// Create a new moderation service.
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, transaction_timeout: Duration) -> Self {
        Self {
            listings,
            fan_out: None,
            transaction_timeout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the queue approved listings are published to.
    pub fn set_fan_out(&mut self, fan_out: Arc<dyn FanOutQueue>) {
        self.fan_out = Some(fan_out);
    }

    /// Approve or reject a pending listing.
    ///
    /// The status change, promotion activation and ledger row commit together
    /// or not at all. On approval a fan-out is enqueued after commit; failing
    /// to enqueue it is logged and does not undo the approval.
    pub async fn decide(&self, actor: &Actor, input: DecisionInput) -> AppResult<DecisionOutcome> {
        authorize(actor.role, Action::DecideModeration)?;
        input.validate()?;

        let outcome = tokio::time::timeout(self.transaction_timeout, self.apply(actor, &input))
            .await
            .map_err(|_| {
                warn!(
                    article_id = %input.article_id,
                    timeout = ?self.transaction_timeout,
                    "Moderation transaction timed out"
                );
                AppError::Persistence(format!(
                    "moderation transaction timed out after {:?}",
                    self.transaction_timeout
                ))
            })??;

        info!(
            article_id = %outcome.article.id,
            moderator_id = %actor.user_id,
            action = ?input.action,
            promotions = outcome.activated_promotions.len(),
            "Moderation decision committed"
        );

        if input.action == ModerationAction::Approve {
            self.publish(&outcome.article).await;
        }

        Ok(outcome)
    }

    async fn apply(&self, actor: &Actor, input: &DecisionInput) -> AppResult<DecisionOutcome> {
        // Any early return drops the transaction, which rolls it back
        let mut txn = self.listings.begin().await?;

        let article = txn
            .get_by_id(&input.article_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {}", input.article_id)))?;

        if article.status != ArticleStatus::PendingModeration {
            return Err(AppError::InvalidStateTransition(format!(
                "listing {} is {:?}, not pending moderation",
                article.id, article.status
            )));
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        let update = match input.action {
            ModerationAction::Approve => StatusUpdate {
                status: ArticleStatus::Approved,
                is_available: true,
                published_at: Some(now),
                moderation_notes: input.notes.clone(),
                rejection_reason: None,
                updated_at: now,
            },
            ModerationAction::Reject => StatusUpdate {
                status: ArticleStatus::Rejected,
                is_available: false,
                published_at: None,
                moderation_notes: input.notes.clone(),
                rejection_reason: input.rejection_reason.clone(),
                updated_at: now,
            },
        };

        if !txn.update_status(&article.id, update).await? {
            return Err(AppError::InvalidStateTransition(format!(
                "listing {} was decided concurrently",
                article.id
            )));
        }

        let activated_promotions = match input.action {
            ModerationAction::Approve => {
                let promotions = txn.list_promotions_by_article(&article.id).await?;
                txn.activate_promotions(&promotions, now).await?
            }
            ModerationAction::Reject => vec![],
        };

        let log = txn
            .insert_moderation_log(moderation_log::Model {
                id: self.id_gen.generate(),
                article_id: article.id.clone(),
                moderator_id: actor.user_id.clone(),
                action: input.action,
                notes: input.notes.clone(),
                created_at: now,
            })
            .await?;

        let article = txn
            .get_by_id(&article.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Listing {}", article.id)))?;

        txn.commit().await?;

        Ok(DecisionOutcome {
            article,
            log,
            activated_promotions,
        })
    }

    async fn publish(&self, article: &article::Model) {
        let Some(ref fan_out) = self.fan_out else {
            return;
        };

        if let Err(e) = fan_out
            .enqueue_fan_out(FanOutEvent::new_article(article))
            .await
        {
            warn!(article_id = %article.id, error = %e, "Failed to enqueue fan-out");
        }
    }

    /// Listings awaiting moderation, oldest first.
    pub async fn list_pending(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> AppResult<Vec<article::Model>> {
        authorize(actor.role, Action::ViewModerationQueue)?;

        self.listings
            .list_pending(page.limit(), page.offset())
            .await
    }

    /// Moderation ledger of one listing, oldest first.
    pub async fn history(
        &self,
        actor: &Actor,
        article_id: &str,
    ) -> AppResult<Vec<moderation_log::Model>> {
        authorize(actor.role, Action::ViewModerationQueue)?;

        if self.listings.get_by_id(article_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Listing {article_id}")));
        }

        self.listings.list_moderation_logs(article_id).await
    }
}
