use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderDraft, OrderEvent, StatusChange};
use tokio::sync::RwLock;

use crate::{
    OrderId, OutboxEntry, OwnerId, Result, StoreError, Version,
    store::{Committed, OrderStore, WriteOptions, commit_time},
};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    idempotency_keys: HashMap<String, OrderId>,
    outbox: BTreeMap<i64, (OutboxEntry, bool)>,
    next_outbox_id: i64,
}

impl Inner {
    fn record_outbox(&mut self, order: &Order, options: WriteOptions) -> Option<OutboxEntry> {
        let event_type = options.outbox?;
        self.next_outbox_id += 1;
        let entry = OutboxEntry {
            id: self.next_outbox_id,
            event: OrderEvent::for_order(order, event_type),
            recorded_at: order.updated_at(),
        };
        self.outbox.insert(entry.id, (entry.clone(), false));
        Some(entry)
    }
}

/// In-memory order store implementation for testing.
///
/// Provides the same interface and the same conditional-write semantics as
/// the PostgreSQL implementation. The write lock is held only for the
/// duration of a single write, so orders never wait on each other beyond
/// that.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    /// Returns the number of outbox entries not yet published.
    pub async fn pending_outbox_count(&self) -> usize {
        self.inner
            .read()
            .await
            .outbox
            .values()
            .filter(|(_, published)| !published)
            .count()
    }

    /// Clears all orders, keys and outbox entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }
}

fn sorted(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then(a.id().cmp(&b.id()))
    });
    orders
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, draft: OrderDraft, options: WriteOptions) -> Result<Committed> {
        let mut inner = self.inner.write().await;

        if let Some(key) = draft.idempotency_key()
            && let Some(existing) = inner.idempotency_keys.get(key)
        {
            let order = inner
                .orders
                .get(existing)
                .cloned()
                .ok_or(StoreError::NotFound(*existing))?;
            tracing::debug!(order_id = %order.id(), "idempotency key replayed");
            return Ok(Committed {
                order,
                replayed: true,
                outbox_entry: None,
            });
        }

        let order_id = OrderId::new();
        let key = draft.idempotency_key().map(str::to_string);
        let order = draft.into_order(order_id, commit_time());

        if let Some(key) = key {
            inner.idempotency_keys.insert(key, order_id);
        }
        inner.orders.insert(order_id, order.clone());
        let outbox_entry = inner.record_outbox(&order, options);

        Ok(Committed {
            order,
            replayed: false,
            outbox_entry,
        })
    }

    async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn conditional_update(
        &self,
        order_id: OrderId,
        expected_version: Version,
        change: StatusChange,
        options: WriteOptions,
    ) -> Result<Committed> {
        let mut inner = self.inner.write().await;

        let stored = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound(order_id))?;

        if stored.version() != expected_version {
            return Err(StoreError::VersionConflict {
                order_id,
                expected: expected_version,
                actual: stored.version(),
            });
        }

        stored.apply_change(change, commit_time());
        let order = stored.clone();
        let outbox_entry = inner.record_outbox(&order, options);

        Ok(Committed {
            order,
            replayed: false,
            outbox_entry,
        })
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let orders = inner
            .orders
            .values()
            .filter(|o| o.owner_id() == owner_id)
            .cloned()
            .collect();
        Ok(sorted(orders))
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        Ok(sorted(inner.orders.values().cloned().collect()))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .values()
            .filter(|(_, published)| !published)
            .map(|(entry, _)| entry.clone())
            .take(limit)
            .collect())
    }

    async fn mark_published(&self, entry_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some((_, published)) = inner.outbox.get_mut(&entry_id) {
            *published = true;
        }
        Ok(())
    }
}
