use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::Order;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{CacheError, OrderCache, OrderId, Result, Version};

/// Cached order, or the tombstone an `invalidate` leaves behind.
struct Slot {
    order: Option<Order>,
    floor: Version,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<OrderId, Slot>,
    fail_on_get: bool,
    fail_on_put: bool,
    fail_on_invalidate: bool,
}

impl State {
    fn live_slot(&mut self, order_id: OrderId, now: Instant) -> Option<&Slot> {
        if self.slots.get(&order_id).is_some_and(|s| s.is_expired(now)) {
            self.slots.remove(&order_id);
        }
        self.slots.get(&order_id)
    }
}

/// In-memory order cache.
///
/// Entries optionally expire after a TTL. Every order keeps a version floor:
/// the version of the last stored order, or the committed version passed to
/// `invalidate`. A `put` below the floor is ignored. Failures can be switched
/// on per operation to exercise degraded paths.
#[derive(Clone, Default)]
pub struct InMemoryOrderCache {
    state: Arc<RwLock<State>>,
    ttl: Option<Duration>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl InMemoryOrderCache {
    /// Creates a cache whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache whose entries expire `ttl` after being stored.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Makes every `get` fail while set.
    pub async fn set_fail_on_get(&self, fail: bool) {
        self.state.write().await.fail_on_get = fail;
    }

    /// Makes every `put` fail while set.
    pub async fn set_fail_on_put(&self, fail: bool) {
        self.state.write().await.fail_on_put = fail;
    }

    /// Makes every `invalidate` fail while set.
    pub async fn set_fail_on_invalidate(&self, fail: bool) {
        self.state.write().await.fail_on_invalidate = fail;
    }

    /// Returns the live entry for an order without touching the counters.
    pub async fn peek(&self, order_id: OrderId) -> Option<Order> {
        let state = self.state.read().await;
        state
            .slots
            .get(&order_id)
            .filter(|s| !s.is_expired(Instant::now()))
            .and_then(|s| s.order.clone())
    }

    /// Lowest version a `put` may still store for an order.
    pub async fn floor(&self, order_id: OrderId) -> Option<Version> {
        let state = self.state.read().await;
        state
            .slots
            .get(&order_id)
            .filter(|s| !s.is_expired(Instant::now()))
            .map(|s| s.floor)
    }

    /// Number of stored orders, expired ones included.
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.slots.values().filter(|s| s.order.is_some()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn expiry(&self, now: Instant) -> Option<Instant> {
        self.ttl.map(|ttl| now + ttl)
    }
}

#[async_trait]
impl OrderCache for InMemoryOrderCache {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        if state.fail_on_get {
            return Err(CacheError::Unavailable("get failed".to_string()));
        }

        match state.live_slot(order_id, Instant::now()).and_then(|s| s.order.clone()) {
            Some(order) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(order))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_put {
            return Err(CacheError::Unavailable("put failed".to_string()));
        }

        let now = Instant::now();
        if let Some(slot) = state.live_slot(order.id(), now)
            && order.version() < slot.floor
        {
            tracing::debug!(
                order_id = %order.id(),
                floor = %slot.floor,
                offered = %order.version(),
                "ignoring older order for cache"
            );
            return Ok(());
        }

        state.slots.insert(
            order.id(),
            Slot {
                order: Some(order.clone()),
                floor: order.version(),
                expires_at: self.expiry(now),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, order_id: OrderId, committed: Version) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_invalidate {
            return Err(CacheError::Unavailable("invalidate failed".to_string()));
        }

        let now = Instant::now();
        let floor = state
            .live_slot(order_id, now)
            .map_or(committed, |s| s.floor.max(committed));
        state.slots.insert(
            order_id,
            Slot {
                order: None,
                floor,
                expires_at: self.expiry(now),
            },
        );
        Ok(())
    }
}
