//! Following service.

use std::sync::Arc;

use chrono::Utc;
use rewear_common::{AppError, AppResult, IdGenerator};
use rewear_db::{
    entities::{
        following,
        notification::{self, NotificationType},
    },
    stores::{NotificationStore, SocialGraphStore},
};
use tracing::{info, warn};

use crate::policy::{Action, Actor, authorize};

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    graph: Arc<dyn SocialGraphStore>,
    notifications: Arc<dyn NotificationStore>,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub fn new(graph: Arc<dyn SocialGraphStore>, notifications: Arc<dyn NotificationStore>) -> Self {
        Self {
            graph,
            notifications,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow a user and notify them.
    pub async fn follow(&self, actor: &Actor, target_id: &str) -> AppResult<following::Model> {
        authorize(actor.role, Action::Follow)?;

        if actor.user_id == target_id {
            return Err(AppError::InvalidOperation(
                "Cannot follow yourself".to_string(),
            ));
        }

        if self.graph.edge_exists(&actor.user_id, target_id).await? {
            return Err(AppError::InvalidOperation(
                "Already following this user".to_string(),
            ));
        }

        // The unique index still catches a racing duplicate here
        let edge = self
            .graph
            .create_edge(following::Model {
                id: self.id_gen.generate(),
                follower_id: actor.user_id.clone(),
                following_id: target_id.to_string(),
                created_at: Utc::now().into(),
            })
            .await?;

        info!(follower_id = %actor.user_id, following_id = %target_id, "Followed user");

        if let Err(e) = self
            .notifications
            .insert_notifications_batch(vec![self.new_follower_notification(&edge)])
            .await
        {
            warn!(following_id = %target_id, error = %e, "Failed to write follower notification");
        }

        Ok(edge)
    }

    /// Unfollow a user. No notification is written.
    pub async fn unfollow(&self, actor: &Actor, target_id: &str) -> AppResult<()> {
        authorize(actor.role, Action::Follow)?;

        if actor.user_id == target_id {
            return Err(AppError::InvalidOperation(
                "Cannot unfollow yourself".to_string(),
            ));
        }

        if !self.graph.delete_edge(&actor.user_id, target_id).await? {
            return Err(AppError::InvalidOperation(
                "Not following this user".to_string(),
            ));
        }

        info!(follower_id = %actor.user_id, following_id = %target_id, "Unfollowed user");
        Ok(())
    }

    fn new_follower_notification(&self, edge: &following::Model) -> notification::Model {
        notification::Model {
            id: self.id_gen.generate(),
            notification_type: NotificationType::NewFollower,
            title: "New follower".to_string(),
            message: "Someone started following you".to_string(),
            user_id: edge.following_id.clone(),
            actor_id: Some(edge.follower_id.clone()),
            entity_id: Some(edge.follower_id.clone()),
            entity_type: Some("user".to_string()),
            is_read: false,
            read_at: None,
            created_at: edge.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rewear_db::entities::user::UserRole;
    use rewear_db::memory::{MemoryNotificationStore, MemorySocialGraph};

    fn setup() -> (FollowingService, MemorySocialGraph, MemoryNotificationStore) {
        let graph = MemorySocialGraph::new();
        let store = MemoryNotificationStore::new();
        let service = FollowingService::new(Arc::new(graph.clone()), Arc::new(store.clone()));
        (service, graph, store)
    }

    fn alice() -> Actor {
        Actor::new("alice", UserRole::User)
    }

    #[tokio::test]
    async fn test_follow_notifies_target() {
        let (service, graph, store) = setup();

        let edge = service.follow(&alice(), "bob").await.unwrap();

        assert_eq!(edge.follower_id, "alice");
        assert_eq!(edge.following_id, "bob");
        assert!(graph.edge_exists("alice", "bob").await.unwrap());

        let rows = store.notifications().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "bob");
        assert_eq!(rows[0].notification_type, NotificationType::NewFollower);
        assert_eq!(rows[0].entity_type.as_deref(), Some("user"));
        assert_eq!(rows[0].entity_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_self_follow_is_rejected_before_any_write() {
        let (service, graph, store) = setup();

        let result = service.follow(&alice(), "alice").await;

        assert!(matches!(result, Err(AppError::InvalidOperation(_))));
        assert_eq!(graph.edge_count().await, 0);
        assert!(store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_follow_is_rejected() {
        let (service, graph, store) = setup();

        service.follow(&alice(), "bob").await.unwrap();
        let second = service.follow(&alice(), "bob").await;

        assert!(matches!(second, Err(AppError::InvalidOperation(_))));
        assert_eq!(graph.edge_count().await, 1);
        assert_eq!(store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unfollow_removes_edge_without_notification() {
        let (service, graph, store) = setup();
        service.follow(&alice(), "bob").await.unwrap();

        service.unfollow(&alice(), "bob").await.unwrap();

        assert_eq!(graph.edge_count().await, 0);
        assert_eq!(store.notifications().await.len(), 1);
        assert!(matches!(
            service.unfollow(&alice(), "bob").await,
            Err(AppError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_edge() {
        let (service, graph, store) = setup();
        store.fail_next_batches(1);

        service.follow(&alice(), "bob").await.unwrap();

        assert!(graph.edge_exists("alice", "bob").await.unwrap());
        assert!(store.notifications().await.is_empty());
    }
}
