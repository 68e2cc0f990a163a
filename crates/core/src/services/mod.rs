//! Business logic services.

#![allow(missing_docs)]

pub mod fan_out;
pub mod following;
pub mod jobs;
pub mod listing;
pub mod moderation;
pub mod notification;
pub mod retention;

pub use fan_out::{
    FanOutDispatcher, FanOutEvent, FanOutKind, FanOutQueue, FanOutReport, FanOutStep,
    NoOpFanOutQueue,
};
pub use following::FollowingService;
pub use jobs::{DeadLetters, Job, JobSender, JobService, JobWorkerContext};
pub use listing::ListingService;
pub use moderation::{DecisionInput, DecisionOutcome, ModerationService};
pub use notification::{ActorSummary, ListNotificationsInput, NotificationService, NotificationView};
pub use retention::{CleanupTask, RetentionReport, RetentionService};
