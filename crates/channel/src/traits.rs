use std::sync::Arc;

use async_trait::async_trait;
use domain::OrderEvent;

use crate::Result;

/// Topic order lifecycle events are published to.
pub const ORDER_EVENTS_TOPIC: &str = "order-events";

/// Publishes order events.
///
/// A successful return means the channel accepted the event durably.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publishes an event under a partition key. Events sharing a key keep
    /// their publish order.
    async fn publish(&self, key: &str, event: &OrderEvent) -> Result<()>;
}

#[async_trait]
impl<T: EventChannel + ?Sized> EventChannel for Arc<T> {
    async fn publish(&self, key: &str, event: &OrderEvent) -> Result<()> {
        (**self).publish(key, event).await
    }
}
