use std::sync::Arc;

use async_trait::async_trait;
use domain::Order;

use crate::{OrderId, Result, Version};

/// Key under which an order is cached.
pub fn cache_key(order_id: OrderId) -> String {
    format!("orders:{order_id}")
}

/// Key holding the lowest version a `put` may still store for an order.
pub fn floor_key(order_id: OrderId) -> String {
    format!("orders:{order_id}:floor")
}

/// Key-value cache of orders by id.
#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Returns the cached order, if present.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Stores a committed order.
    ///
    /// An order older than the version floor left by an earlier `put` or
    /// `invalidate` is ignored, so a read that raced a write cannot bring
    /// back a superseded snapshot.
    async fn put(&self, order: &Order) -> Result<()>;

    /// Removes the entry for an order and raises its version floor to
    /// `committed`. Removing a missing entry succeeds.
    async fn invalidate(&self, order_id: OrderId, committed: Version) -> Result<()>;
}

#[async_trait]
impl<T: OrderCache + ?Sized> OrderCache for Arc<T> {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).get(order_id).await
    }

    async fn put(&self, order: &Order) -> Result<()> {
        (**self).put(order).await
    }

    async fn invalidate(&self, order_id: OrderId, committed: Version) -> Result<()> {
        (**self).invalidate(order_id, committed).await
    }
}
