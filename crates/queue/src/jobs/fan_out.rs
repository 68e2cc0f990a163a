//! Fan-out job.

use rewear_core::FanOutEvent;
use serde::{Deserialize, Serialize};

/// Job to propagate a publishing event to the seller's followers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutJob {
    /// The event to propagate.
    pub event: FanOutEvent,

    /// Followers still owed a notification. `None` replays the whole event,
    /// feed item included.
    #[serde(default)]
    pub recipients: Option<Vec<String>>,

    /// Zero-based attempt number.
    #[serde(default)]
    pub attempt: u32,
}

impl FanOutJob {
    /// Create the first attempt of a fan-out job.
    #[must_use]
    pub const fn new(event: FanOutEvent) -> Self {
        Self {
            event,
            recipients: None,
            attempt: 0,
        }
    }

    /// Create a follow-up attempt.
    #[must_use]
    pub const fn retry(event: FanOutEvent, recipients: Option<Vec<String>>, attempt: u32) -> Self {
        Self {
            event,
            recipients,
            attempt,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rewear_core::FanOutKind;

    #[test]
    fn test_payload_without_retry_fields_is_first_attempt() {
        let job: FanOutJob = serde_json::from_value(serde_json::json!({
            "event": {
                "kind": "NEW_ARTICLE",
                "actor_id": "seller1",
                "article_id": "a1",
                "article_title": "Linen shirt"
            }
        }))
        .unwrap();

        assert_eq!(job.event.kind, FanOutKind::NewArticle);
        assert!(job.recipients.is_none());
        assert_eq!(job.attempt, 0);
    }
}
