use std::time::Duration;

use crate::RetryConfig;

/// What a successful mutation does to the cache entry of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Evict the entry; the next read repopulates it from the store.
    #[default]
    Invalidate,
    /// Overwrite the entry with the committed order.
    WriteThrough,
}

impl std::str::FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "invalidate" => Ok(CachePolicy::Invalidate),
            "write-through" | "write_through" => Ok(CachePolicy::WriteThrough),
            other => Err(format!("unknown cache policy: {other}")),
        }
    }
}

/// How lifecycle events reach the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Publish after commit with bounded retries. A lost publish is
    /// reported as a warning and not recovered.
    #[default]
    Direct,
    /// Record the event in the store's outbox within the same write, then
    /// publish. Entries that could not be published are drained later by
    /// the [`OutboxRelay`](crate::OutboxRelay).
    Outbox,
}

impl std::str::FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(PublishMode::Direct),
            "outbox" => Ok(PublishMode::Outbox),
            other => Err(format!("unknown publish mode: {other}")),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
    pub publish_timeout: Duration,
    pub retry: RetryConfig,
    pub cache_policy: CachePolicy,
    pub publish_mode: PublishMode,
    /// Maximum outbox entries drained per relay pass.
    pub outbox_batch_size: usize,
    pub outbox_poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            cache_timeout: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
            cache_policy: CachePolicy::default(),
            publish_mode: PublishMode::default(),
            outbox_batch_size: 100,
            outbox_poll_interval: Duration::from_secs(1),
        }
    }
}

impl LifecycleConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    pub fn with_outbox_poll_interval(mut self, interval: Duration) -> Self {
        self.outbox_poll_interval = interval;
        self
    }
}
