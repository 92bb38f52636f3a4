//! Engine configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// This instance's identity.
    pub instance: InstanceConfig,
    /// Signing and outbound HTTP settings.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Job queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Retry sweep settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Instance identity.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Public URL of this instance.
    pub url: String,
    /// User agent sent on every outbound request.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl InstanceConfig {
    /// The configured user agent, or `apub-engine/<version> (+<url>)`.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!("apub-engine/{} (+{})", env!("CARGO_PKG_VERSION"), self.url)
        })
    }
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Accepted distance between an inbound `Date` header and now, both directions.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,
    /// Total timeout of one outbound request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout of one outbound request.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long a fetched remote actor key stays cached.
    #[serde(default = "default_actor_cache_ttl_secs")]
    pub actor_cache_ttl_secs: u64,
}

impl FederationConfig {
    /// Outbound request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Outbound connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Remote actor cache TTL.
    #[must_use]
    pub const fn actor_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.actor_cache_ttl_secs)
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_secs: default_max_clock_skew_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            actor_cache_ttl_secs: default_actor_cache_ttl_secs(),
        }
    }
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Redis connection URL, when the Redis-backed queue is used.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Key prefix for all queue keys.
    #[serde(default = "default_queue_prefix")]
    pub prefix: String,
    /// Concurrent workers per lane.
    #[serde(default = "default_workers_per_lane")]
    pub workers_per_lane: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            prefix: default_queue_prefix(),
            workers_per_lane: default_workers_per_lane(),
        }
    }
}

/// Retry sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// How often the sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Age after which a `waiting` event counts as stuck.
    #[serde(default = "default_stale_age_secs")]
    pub stale_age_secs: u64,
    /// Events with this many attempts are left alone.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_age_secs: default_stale_age_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

const fn default_max_clock_skew_secs() -> u64 {
    300
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_actor_cache_ttl_secs() -> u64 {
    3600
}

fn default_queue_prefix() -> String {
    "apub".to_string()
}

const fn default_workers_per_lane() -> usize {
    4
}

const fn default_sweep_interval_secs() -> u64 {
    300
}

const fn default_stale_age_secs() -> u64 {
    3600
}

const fn default_max_attempts() -> u32 {
    3
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `APUB_ENV`)
    /// 4. Environment variables with `APUB__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APUB_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("APUB")
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
                config::Environment::with_prefix("APUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
