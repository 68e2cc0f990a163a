//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. Fan-out runs in-process when absent.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Moderation configuration.
    #[serde(default)]
    pub moderation: ModerationConfig,
    /// Fan-out configuration.
    #[serde(default)]
    pub fan_out: FanOutConfig,
    /// Retention configuration.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Moderation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// Upper bound for one moderation decision transaction.
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FanOutConfig {
    /// Number of notifications written per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout applied to each batch write.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Attempts per batch within one dispatch.
    #[serde(default = "default_max_batch_attempts")]
    pub max_batch_attempts: u32,
    /// Attempts per fan-out job before it is dead-lettered.
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    /// Cap for the exponential backoff.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

/// Retention configuration for feed items and read notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Feed items older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub feed_item_days: u32,
    /// Read notifications older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub read_notification_days: u32,
    /// How often the cleanup runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl ModerationConfig {
    /// Transaction timeout as a [`Duration`].
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

impl FanOutConfig {
    /// Batch timeout as a [`Duration`].
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Initial retry delay as a [`Duration`].
    #[must_use]
    pub const fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    /// Maximum retry delay as a [`Duration`].
    #[must_use]
    pub const fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

impl RetentionConfig {
    /// Cleanup interval as a [`Duration`].
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_transaction_timeout_ms(),
        }
    }
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_batch_attempts: default_max_batch_attempts(),
            max_job_attempts: default_max_job_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            feed_item_days: default_retention_days(),
            read_notification_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "rewear".to_string()
}

const fn default_transaction_timeout_ms() -> u64 {
    5_000
}

const fn default_batch_size() -> usize {
    500
}

const fn default_batch_timeout_ms() -> u64 {
    10_000
}

const fn default_max_batch_attempts() -> u32 {
    3
}

const fn default_max_job_attempts() -> u32 {
    5
}

const fn default_initial_retry_delay_ms() -> u64 {
    1_000
}

const fn default_max_retry_delay_ms() -> u64 {
    60_000
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `REWEAR_ENV`)
    /// 3. Environment variables with `REWEAR_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("REWEAR_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("REWEAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("REWEAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
