//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20251001_000001_create_user_table;
mod m20251001_000002_create_article_table;
mod m20251001_000003_create_article_promotion_table;
mod m20251001_000004_create_moderation_log_table;
mod m20251001_000005_create_following_table;
mod m20251001_000006_create_feed_item_table;
mod m20251001_000007_create_notification_table;

/// Migrator for running all migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_user_table::Migration),
            Box::new(m20251001_000002_create_article_table::Migration),
            Box::new(m20251001_000003_create_article_promotion_table::Migration),
            Box::new(m20251001_000004_create_moderation_log_table::Migration),
            Box::new(m20251001_000005_create_following_table::Migration),
            Box::new(m20251001_000006_create_feed_item_table::Migration),
            Box::new(m20251001_000007_create_notification_table::Migration),
        ]
    }
}
