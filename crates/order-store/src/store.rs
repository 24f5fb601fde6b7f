use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use domain::{EventType, Order, OrderDraft, StatusChange};

use crate::{OrderId, OutboxEntry, OwnerId, Result, StoreError, Version};

/// Options for a store write.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// When set, the store records an event of this type for the committed
    /// state in the outbox, inside the same atomic write.
    pub outbox: Option<EventType>,
}

impl WriteOptions {
    /// Creates options for a plain write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options that also record an outbox event.
    pub fn with_outbox(event_type: EventType) -> Self {
        Self {
            outbox: Some(event_type),
        }
    }
}

/// Result of a committed store write.
#[derive(Debug, Clone)]
pub struct Committed {
    /// The order as it is now durably stored.
    pub order: Order,

    /// True when a create matched an already used idempotency key and
    /// nothing was written.
    pub replayed: bool,

    /// The outbox entry written alongside the change, if requested.
    pub outbox_entry: Option<OutboxEntry>,
}

/// Core trait for order store implementations.
///
/// The store is the system of record. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order with all its lines atomically.
    ///
    /// Assigns the id, sets `version = 1` and both timestamps. If the draft
    /// carries an idempotency key that was already used, returns the
    /// existing order with `replayed = true` and writes nothing.
    async fn create(&self, draft: OrderDraft, options: WriteOptions) -> Result<Committed>;

    /// Point lookup of an order with its lines.
    async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Applies a status change if the stored version equals `expected_version`.
    ///
    /// Fails with `NotFound` for an unknown id and with `VersionConflict`
    /// when another writer committed first.
    async fn conditional_update(
        &self,
        order_id: OrderId,
        expected_version: Version,
        change: StatusChange,
        options: WriteOptions,
    ) -> Result<Committed>;

    /// Lists the orders of one owner, oldest first.
    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>>;

    /// Lists every order, oldest first.
    async fn list_all(&self) -> Result<Vec<Order>>;

    /// Returns up to `limit` unpublished outbox entries in recording order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks an outbox entry as published. Unknown ids are ignored.
    async fn mark_published(&self, entry_id: i64) -> Result<()>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order, failing with `NotFound` if it doesn't exist.
    async fn get_required(&self, order_id: OrderId) -> Result<Order> {
        self.get_by_id(order_id)
            .await?
            .ok_or(StoreError::NotFound(order_id))
    }

    /// Checks if an order exists.
    async fn exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.get_by_id(order_id).await?.is_some())
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn create(&self, draft: OrderDraft, options: WriteOptions) -> Result<Committed> {
        (**self).create(draft, options).await
    }

    async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).get_by_id(order_id).await
    }

    async fn conditional_update(
        &self,
        order_id: OrderId,
        expected_version: Version,
        change: StatusChange,
        options: WriteOptions,
    ) -> Result<Committed> {
        (**self)
            .conditional_update(order_id, expected_version, change, options)
            .await
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>> {
        (**self).list_by_owner(owner_id).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        (**self).list_all().await
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        (**self).pending_outbox(limit).await
    }

    async fn mark_published(&self, entry_id: i64) -> Result<()> {
        (**self).mark_published(entry_id).await
    }
}

/// Current time at the precision every store can persist (microseconds).
///
/// Keeping one precision everywhere makes an event rebuilt from a reloaded
/// order carry the same `occurred_at` as the one built at commit time.
pub(crate) fn commit_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
