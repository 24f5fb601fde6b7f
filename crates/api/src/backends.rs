//! Backend selection for the store, cache and event channel.

use std::sync::Arc;

use cache::{CacheError, InMemoryOrderCache, OrderCache};
use channel::{ChannelError, EventChannel, InMemoryEventChannel};
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore, StoreError};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::config::Config;

pub type DynStore = Arc<dyn OrderStore>;
pub type DynCache = Arc<dyn OrderCache>;
pub type DynChannel = Arc<dyn EventChannel>;

/// Failure to bring up a configured backend.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to connect to Postgres: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Cache setup failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Channel setup failed: {0}")]
    Channel(#[from] ChannelError),
}

/// The collaborators the engine runs against.
#[derive(Clone)]
pub struct Backends {
    pub store: DynStore,
    pub cache: DynCache,
    pub channel: DynChannel,
}

impl Backends {
    /// In-memory store, cache and channel.
    pub fn in_memory(config: &Config) -> Self {
        Self {
            store: Arc::new(InMemoryOrderStore::new()),
            cache: in_memory_cache(config),
            channel: Arc::new(InMemoryEventChannel::new()),
        }
    }

    /// Connects the backends named in `config`, in-memory for the rest.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let store: DynStore = match config.database_url.as_deref() {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(config.store_timeout)
                    .connect(url)
                    .await?;
                let store = PostgresOrderStore::new(pool);
                store.run_migrations().await?;
                tracing::info!("using Postgres order store");
                Arc::new(store)
            }
            None => {
                tracing::info!("using in-memory order store");
                Arc::new(InMemoryOrderStore::new())
            }
        };

        let cache: DynCache = match config.redis_url.as_deref() {
            #[cfg(feature = "redis")]
            Some(url) => {
                let cache = cache::RedisOrderCache::new(url, config.cache_ttl).await?;
                tracing::info!("using Redis order cache");
                Arc::new(cache)
            }
            #[cfg(not(feature = "redis"))]
            Some(_) => {
                tracing::warn!("REDIS_URL is set but redis support is not compiled in");
                in_memory_cache(config)
            }
            None => in_memory_cache(config),
        };

        let channel: DynChannel = match config.kafka_brokers.as_deref() {
            #[cfg(feature = "kafka")]
            Some(brokers) => {
                let channel = channel::KafkaEventChannel::new(
                    channel::KafkaEventChannelConfig::new(brokers)
                        .with_message_timeout(config.publish_timeout),
                )?;
                tracing::info!(brokers, "using Kafka event channel");
                Arc::new(channel)
            }
            #[cfg(not(feature = "kafka"))]
            Some(_) => {
                tracing::warn!("KAFKA_BROKERS is set but kafka support is not compiled in");
                Arc::new(InMemoryEventChannel::new())
            }
            None => {
                tracing::info!("using in-memory event channel");
                Arc::new(InMemoryEventChannel::new())
            }
        };

        Ok(Self {
            store,
            cache,
            channel,
        })
    }
}

fn in_memory_cache(config: &Config) -> DynCache {
    match config.cache_ttl {
        Some(ttl) => Arc::new(InMemoryOrderCache::with_ttl(ttl)),
        None => Arc::new(InMemoryOrderCache::new()),
    }
}
