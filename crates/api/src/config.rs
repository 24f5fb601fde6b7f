//! Application configuration loaded from environment variables.

use std::time::Duration;

use lifecycle::{CachePolicy, LifecycleConfig, PublishMode};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres store when set, in-memory otherwise
/// - `REDIS_URL`: Redis cache when set and built with `redis`
/// - `KAFKA_BROKERS`: Kafka channel when set and built with `kafka`
/// - `STORE_TIMEOUT_MS`, `CACHE_TIMEOUT_MS`, `PUBLISH_TIMEOUT_MS`
/// - `CACHE_TTL_SECS`: cache entry lifetime, `0` disables expiry (default: `300`)
/// - `CACHE_POLICY`: `invalidate` or `write-through`
/// - `PUBLISH_MODE`: `direct` or `outbox`
/// - `OUTBOX_POLL_MS`: relay poll interval (default: `1000`)
///
/// Unparsable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
    pub publish_timeout: Duration,
    pub cache_ttl: Option<Duration>,
    pub cache_policy: CachePolicy,
    pub publish_mode: PublishMode,
    pub outbox_poll_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            kafka_brokers: non_empty("KAFKA_BROKERS"),
            store_timeout: millis("STORE_TIMEOUT_MS", defaults.store_timeout),
            cache_timeout: millis("CACHE_TIMEOUT_MS", defaults.cache_timeout),
            publish_timeout: millis("PUBLISH_TIMEOUT_MS", defaults.publish_timeout),
            cache_ttl: match lookup("CACHE_TTL_SECS").and_then(|v| v.parse::<u64>().ok()) {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.cache_ttl,
            },
            cache_policy: lookup("CACHE_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_policy),
            publish_mode: lookup("PUBLISH_MODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.publish_mode),
            outbox_poll_interval: millis("OUTBOX_POLL_MS", defaults.outbox_poll_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the engine configuration.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig::default()
            .with_store_timeout(self.store_timeout)
            .with_cache_timeout(self.cache_timeout)
            .with_publish_timeout(self.publish_timeout)
            .with_cache_policy(self.cache_policy)
            .with_publish_mode(self.publish_mode)
            .with_outbox_poll_interval(self.outbox_poll_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        let engine = LifecycleConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            kafka_brokers: None,
            store_timeout: engine.store_timeout,
            cache_timeout: engine.cache_timeout,
            publish_timeout: engine.publish_timeout,
            cache_ttl: Some(Duration::from_secs(300)),
            cache_policy: engine.cache_policy,
            publish_mode: engine.publish_mode,
            outbox_poll_interval: engine.outbox_poll_interval,
        }
    }
}
