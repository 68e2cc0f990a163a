//! Notification service: the read side of fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rewear_common::{AppError, AppResult};
use rewear_db::{
    entities::{feed_item, notification, user},
    stores::{NotificationStore, SocialGraphStore, UserStore},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pagination::PageRequest;
use crate::policy::{Action, Actor, authorize};

/// Input for listing notifications.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsInput {
    #[serde(flatten)]
    pub page: PageRequest,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub with_actor: bool,
}

/// Public identity of the user behind a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSummary {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
}

impl From<user::Model> for ActorSummary {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

/// A notification as returned to its recipient.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: notification::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorSummary>,
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    graph: Arc<dyn SocialGraphStore>,
    users: Arc<dyn UserStore>,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        graph: Arc<dyn SocialGraphStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            notifications,
            graph,
            users,
        }
    }

    /// List the caller's notifications, newest first.
    ///
    /// Rows sharing a dedup key collapse to the newest one before paging.
    pub async fn list(
        &self,
        actor: &Actor,
        input: ListNotificationsInput,
    ) -> AppResult<Vec<NotificationView>> {
        authorize(actor.role, Action::ReadNotifications)?;

        let rows = self
            .notifications
            .list_notifications(
                &actor.user_id,
                input.page.limit(),
                input.page.offset(),
                input.unread_only,
            )
            .await?;

        let actors = if input.with_actor {
            self.load_actors(&rows).await?
        } else {
            HashMap::new()
        };

        Ok(rows
            .into_iter()
            .map(|notification| {
                let actor = notification
                    .actor_id
                    .as_ref()
                    .and_then(|id| actors.get(id).cloned());
                NotificationView {
                    notification,
                    actor,
                }
            })
            .collect())
    }

    /// Number of unread notifications, counted once per dedup key.
    pub async fn unread_count(&self, actor: &Actor) -> AppResult<u64> {
        authorize(actor.role, Action::ReadNotifications)?;
        self.notifications.count_unread(&actor.user_id).await
    }

    /// Mark one notification, and every unread duplicate of it, as read.
    pub async fn mark_read(&self, actor: &Actor, notification_id: &str) -> AppResult<u64> {
        authorize(actor.role, Action::ReadNotifications)?;

        let notification = self
            .notifications
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification: {notification_id}")))?;

        if notification.user_id != actor.user_id {
            return Err(AppError::Forbidden(
                "Cannot mark another user's notification".to_string(),
            ));
        }

        let updated = self
            .notifications
            .mark_read(&notification, Utc::now().into())
            .await?;

        debug!(notification_id = %notification_id, updated, "Marked notification as read");
        Ok(updated)
    }

    /// Mark every unread notification of the caller as read.
    pub async fn mark_all_read(&self, actor: &Actor) -> AppResult<u64> {
        authorize(actor.role, Action::ReadNotifications)?;
        self.notifications
            .mark_all_read(&actor.user_id, Utc::now().into())
            .await
    }

    /// Feed items of the accounts the caller follows, newest first.
    pub async fn timeline(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> AppResult<Vec<feed_item::Model>> {
        authorize(actor.role, Action::ReadNotifications)?;

        let following = self.graph.list_following_ids(&actor.user_id).await?;
        self.notifications
            .list_feed_items(&following, page.limit(), page.offset())
            .await
    }

    async fn load_actors(
        &self,
        rows: &[notification::Model],
    ) -> AppResult<HashMap<String, ActorSummary>> {
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|n| n.actor_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let users = self.users.find_by_ids(&ids).await?;
        Ok(users
            .into_iter()
            .map(|u| (u.id.clone(), ActorSummary::from(u)))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rewear_db::entities::{
        feed_item::FeedItemType, following, notification::NotificationType, user::UserRole,
    };
    use rewear_db::memory::{MemoryNotificationStore, MemorySocialGraph, MemoryUserStore};

    struct Fixture {
        service: NotificationService,
        store: MemoryNotificationStore,
        graph: MemorySocialGraph,
        users: MemoryUserStore,
    }

    fn setup() -> Fixture {
        let store = MemoryNotificationStore::new();
        let graph = MemorySocialGraph::new();
        let users = MemoryUserStore::new();
        let service = NotificationService::new(
            Arc::new(store.clone()),
            Arc::new(graph.clone()),
            Arc::new(users.clone()),
        );
        Fixture {
            service,
            store,
            graph,
            users,
        }
    }

    fn bob() -> Actor {
        Actor::new("bob", UserRole::User)
    }

    fn article_notification(id: &str, entity: &str, minutes_ago: i64) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            notification_type: NotificationType::NewArticleFromFollowed,
            title: "New article".to_string(),
            message: "Sneakers".to_string(),
            user_id: "bob".to_string(),
            actor_id: Some("seller1".to_string()),
            entity_id: Some(entity.to_string()),
            entity_type: Some("article".to_string()),
            is_read: false,
            read_at: None,
            created_at: (Utc::now() - Duration::minutes(minutes_ago)).into(),
        }
    }

    fn feed_item(id: &str, actor: &str, minutes_ago: i64) -> feed_item::Model {
        feed_item::Model {
            id: id.to_string(),
            item_type: FeedItemType::NewArticle,
            user_id: actor.to_string(),
            article_id: Some(format!("article-{id}")),
            content: None,
            created_at: (Utc::now() - Duration::minutes(minutes_ago)).into(),
        }
    }

    #[tokio::test]
    async fn test_list_collapses_duplicates_to_newest() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 10)).await;
        f.store.insert_notification(article_notification("n2", "a1", 5)).await;
        f.store.insert_notification(article_notification("n3", "a2", 1)).await;

        let views = f
            .service
            .list(&bob(), ListNotificationsInput::default())
            .await
            .unwrap();

        let ids: Vec<_> = views.iter().map(|v| v.notification.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n2"]);
        assert!(views.iter().all(|v| v.actor.is_none()));
    }

    #[tokio::test]
    async fn test_duplicates_do_not_spill_onto_next_page() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 10)).await;
        f.store.insert_notification(article_notification("n2", "a2", 5)).await;
        f.store.insert_notification(article_notification("n3", "a1", 1)).await;

        let page = |n| ListNotificationsInput {
            page: PageRequest::new(n, 2),
            ..Default::default()
        };

        let first = f.service.list(&bob(), page(1)).await.unwrap();
        let ids: Vec<_> = first.iter().map(|v| v.notification.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n2"]);

        let second = f.service.list(&bob(), page(2)).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_list_with_actor_attaches_identity() {
        let f = setup();
        f.users
            .insert_user(user::Model {
                id: "seller1".to_string(),
                username: "seller".to_string(),
                display_name: Some("Seller One".to_string()),
                role: UserRole::User,
                token: None,
                created_at: Utc::now().into(),
            })
            .await;
        f.store.insert_notification(article_notification("n1", "a1", 1)).await;

        let views = f
            .service
            .list(
                &bob(),
                ListNotificationsInput {
                    with_actor: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let actor = views[0].actor.as_ref().unwrap();
        assert_eq!(actor.username, "seller");
        assert_eq!(actor.display_name.as_deref(), Some("Seller One"));
    }

    #[tokio::test]
    async fn test_unread_count_collapses_duplicates() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 2)).await;
        f.store.insert_notification(article_notification("n2", "a1", 1)).await;
        f.store.insert_notification(article_notification("n3", "a2", 1)).await;

        assert_eq!(f.service.unread_count(&bob()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_clears_duplicates() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 2)).await;
        f.store.insert_notification(article_notification("n2", "a1", 1)).await;

        let updated = f.service.mark_read(&bob(), "n1").await.unwrap();

        assert_eq!(updated, 2);
        assert_eq!(f.service.unread_count(&bob()).await.unwrap(), 0);
        assert!(
            f.store
                .notifications()
                .await
                .iter()
                .all(|n| n.is_read && n.read_at.is_some())
        );
    }

    #[tokio::test]
    async fn test_mark_read_by_non_owner_is_forbidden() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 1)).await;

        let result = f
            .service
            .mark_read(&Actor::new("mallory", UserRole::User), "n1")
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(!f.store.notifications().await[0].is_read);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_is_not_found() {
        let f = setup();

        let result = f.service.mark_read(&bob(), "missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let f = setup();
        f.store.insert_notification(article_notification("n1", "a1", 2)).await;
        f.store.insert_notification(article_notification("n2", "a2", 1)).await;

        assert_eq!(f.service.mark_all_read(&bob()).await.unwrap(), 2);
        assert_eq!(f.service.unread_count(&bob()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timeline_shows_only_followed_actors() {
        let f = setup();
        f.graph
            .create_edge(following::Model {
                id: "e1".to_string(),
                follower_id: "bob".to_string(),
                following_id: "seller1".to_string(),
                created_at: Utc::now().into(),
            })
            .await
            .unwrap();
        f.store.insert_feed_item_raw(feed_item("f1", "seller1", 10)).await;
        f.store.insert_feed_item_raw(feed_item("f2", "stranger", 5)).await;
        f.store.insert_feed_item_raw(feed_item("f3", "seller1", 1)).await;

        let items = f
            .service
            .timeline(&bob(), PageRequest::default())
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["f3", "f1"]);
    }

    #[tokio::test]
    async fn test_timeline_without_following_is_empty() {
        let f = setup();
        f.store.insert_feed_item_raw(feed_item("f1", "seller1", 1)).await;

        let items = f
            .service
            .timeline(&bob(), PageRequest::default())
            .await
            .unwrap();

        assert!(items.is_empty());
    }
}
