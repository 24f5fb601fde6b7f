//! Redis order cache.

use std::time::Duration;

use async_trait::async_trait;
use domain::Order;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use tracing::{debug, info};

use crate::{OrderCache, OrderId, Result, Version, cache_key, floor_key};

/// KEYS: entry, floor. ARGV: version, json, ttl seconds (0 for none).
/// Returns 1 when stored, 0 when the version is below the floor.
const PUT_SCRIPT: &str = r#"
local floor = tonumber(redis.call('GET', KEYS[2]) or '0')
local version = tonumber(ARGV[1])
if version < floor then
  return 0
end
local ttl = tonumber(ARGV[3])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ttl)
  redis.call('SET', KEYS[2], ARGV[1], 'EX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[2])
  redis.call('SET', KEYS[2], ARGV[1])
end
return 1
"#;

/// KEYS: entry, floor. ARGV: committed version, ttl seconds (0 for none).
const INVALIDATE_SCRIPT: &str = r#"
redis.call('DEL', KEYS[1])
local floor = tonumber(redis.call('GET', KEYS[2]) or '0')
local committed = tonumber(ARGV[1])
if committed > floor then
  floor = committed
end
local ttl = tonumber(ARGV[2])
if ttl > 0 then
  redis.call('SET', KEYS[2], floor, 'EX', ttl)
else
  redis.call('SET', KEYS[2], floor)
end
return floor
"#;

/// Redis-backed order cache.
///
/// Orders are stored as JSON under `orders:{id}`, with an expiry when a TTL
/// is configured. The version floor lives under `orders:{id}:floor` and is
/// checked and written by server-side scripts, so a stale `put` cannot slip
/// in between the check and the write.
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
    ttl: Option<Duration>,
    put_script: Script,
    invalidate_script: Script,
}

impl RedisOrderCache {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `ttl` - Expiry for stored entries; `None` keeps them until invalidated
    pub async fn new(url: &str, ttl: Option<Duration>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis for order cache");

        Ok(Self {
            conn,
            ttl,
            put_script: Script::new(PUT_SCRIPT),
            invalidate_script: Script::new(INVALIDATE_SCRIPT),
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.map_or(0, |ttl| ttl.as_secs().max(1))
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let key = cache_key(order_id);
        let mut conn = self.conn.clone();

        let json: Option<String> = conn.get(&key).await?;

        match json {
            Some(json) => {
                let order = serde_json::from_str(&json)?;
                debug!(order_id = %order_id, "Cache hit");
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, order: &Order) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(order)?;

        let stored: i64 = self
            .put_script
            .key(cache_key(order.id()))
            .key(floor_key(order.id()))
            .arg(order.version().as_i64())
            .arg(json)
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;

        if stored == 1 {
            debug!(order_id = %order.id(), version = %order.version(), "Cached order");
        } else {
            debug!(order_id = %order.id(), version = %order.version(), "Ignored order older than cache floor");
        }
        Ok(())
    }

    async fn invalidate(&self, order_id: OrderId, committed: Version) -> Result<()> {
        let mut conn = self.conn.clone();

        let floor: i64 = self
            .invalidate_script
            .key(cache_key(order_id))
            .key(floor_key(order_id))
            .arg(committed.as_i64())
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;

        debug!(order_id = %order_id, floor, "Invalidated cached order");
        Ok(())
    }
}
