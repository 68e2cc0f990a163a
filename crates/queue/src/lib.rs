//! Background job queue for rewear.
//!
//! This crate provides durable job processing on Redis:
//!
//! - **Jobs**: fan-out of publishing events
//! - **Workers**: apalis worker driving the fan-out dispatcher
//! - **Scheduler**: periodic retention of feed items and read notifications

pub mod fan_out_impl;
pub mod jobs;
pub mod scheduler;
pub mod workers;

pub use fan_out_impl::{RedisFanOutQueue, fan_out_storage};
pub use jobs::*;
pub use scheduler::{JobExecutor, ScheduledJob, SchedulerConfig, run_scheduler};
pub use workers::*;
