//! Role-based authorization policy.
//!
//! Every core operation calls [`authorize`] before touching a store.

use rewear_common::{AppError, AppResult};
use rewear_db::entities::user::UserRole;
use serde::{Deserialize, Serialize};

/// Authenticated caller, as supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: UserRole,
}

impl Actor {
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

/// Operations subject to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewModerationQueue,
    DecideModeration,
    Follow,
    ReadNotifications,
    MarkSold,
}

/// Check whether `role` may perform `action`.
///
/// Moderators can see the queue but only admins can decide.
pub fn authorize(role: UserRole, action: Action) -> AppResult<()> {
    let allowed = match action {
        Action::DecideModeration => matches!(role, UserRole::Admin),
        Action::ViewModerationQueue => matches!(role, UserRole::Moderator | UserRole::Admin),
        Action::Follow | Action::ReadNotifications | Action::MarkSold => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{role:?} is not allowed to perform {action:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_decides() {
        assert!(authorize(UserRole::Admin, Action::DecideModeration).is_ok());
        assert!(matches!(
            authorize(UserRole::Moderator, Action::DecideModeration),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(UserRole::User, Action::DecideModeration),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_moderator_views_queue() {
        assert!(authorize(UserRole::Moderator, Action::ViewModerationQueue).is_ok());
        assert!(authorize(UserRole::Admin, Action::ViewModerationQueue).is_ok());
        assert!(authorize(UserRole::User, Action::ViewModerationQueue).is_err());
    }

    #[test]
    fn test_social_actions_open_to_users() {
        for action in [Action::Follow, Action::ReadNotifications, Action::MarkSold] {
            assert!(authorize(UserRole::User, action).is_ok());
        }
    }
}
