use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{EventType, OrderEvent};
use tokio::sync::RwLock;

use crate::{ChannelError, EventChannel, OrderId, Result};

/// An event accepted by the in-memory channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub key: String,
    pub event: OrderEvent,
}

#[derive(Default)]
struct State {
    log: Vec<PublishedEvent>,
    fail_next: u32,
    fail_all: bool,
    delay: Option<Duration>,
}

/// In-memory event channel for testing.
///
/// Keeps every accepted event in one log, so per-key order is publish
/// order. Failures and slow acknowledgements can be injected.
#[derive(Clone, Default)]
pub struct InMemoryEventChannel {
    state: Arc<RwLock<State>>,
}

impl InMemoryEventChannel {
    /// Creates a new empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` publishes.
    pub async fn fail_next(&self, count: u32) {
        self.state.write().await.fail_next = count;
    }

    /// Rejects every publish while set.
    pub async fn set_fail_all(&self, fail: bool) {
        self.state.write().await.fail_all = fail;
    }

    /// Delays every acknowledgement by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns every accepted event in publish order.
    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.state.read().await.log.clone()
    }

    /// Returns the accepted events of one order in publish order.
    pub async fn events_for(&self, order_id: OrderId) -> Vec<OrderEvent> {
        self.state
            .read()
            .await
            .log
            .iter()
            .filter(|p| p.event.order_id == order_id)
            .map(|p| p.event.clone())
            .collect()
    }

    /// Returns the types of the accepted events of one order.
    pub async fn event_types_for(&self, order_id: OrderId) -> Vec<EventType> {
        self.events_for(order_id)
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Number of accepted events.
    pub async fn len(&self) -> usize {
        self.state.read().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clears the log and all injected failures.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, key: &str, event: &OrderEvent) -> Result<()> {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.fail_all {
            return Err(ChannelError::Unavailable("channel is down".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ChannelError::Unavailable(
                "publish rejected".to_string(),
            ));
        }

        state.log.push(PublishedEvent {
            key: key.to_string(),
            event: event.clone(),
        });
        tracing::debug!(
            key = %key,
            event_type = %event.event_type,
            sequence = %event.sequence,
            "Published event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Money, Order, OrderDraft, OrderLine, OrderStatus, OwnerId};

    fn order() -> Order {
        OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("p1", "Chair", 4, Money::from_cents(2500))],
        )
        .unwrap()
        .into_order(OrderId::new(), Utc::now())
    }

    #[tokio::test]
    async fn test_publish_keeps_order_per_key() {
        let channel = InMemoryEventChannel::new();
        let mut order = order();
        let other = self::order();

        channel
            .publish(
                &order.id().to_string(),
                &OrderEvent::for_order(&order, EventType::Created),
            )
            .await
            .unwrap();
        channel
            .publish(
                &other.id().to_string(),
                &OrderEvent::for_order(&other, EventType::Created),
            )
            .await
            .unwrap();
        let change = order.plan_transition(OrderStatus::Confirmed).unwrap();
        order.apply_change(change, Utc::now());
        channel
            .publish(
                &order.id().to_string(),
                &OrderEvent::for_order(&order, EventType::StatusUpdated),
            )
            .await
            .unwrap();

        assert_eq!(channel.len().await, 3);
        assert_eq!(
            channel.event_types_for(order.id()).await,
            vec![EventType::Created, EventType::StatusUpdated]
        );
        let sequences: Vec<_> = channel
            .events_for(order.id())
            .await
            .iter()
            .map(|e| e.sequence.as_i64())
            .collect();
        assert_eq!(sequences, vec![1, 2]);
        assert!(
            channel
                .published()
                .await
                .iter()
                .all(|p| p.key == p.event.order_id.to_string())
        );
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let channel = InMemoryEventChannel::new();
        let order = order();
        let event = OrderEvent::for_order(&order, EventType::Created);
        let key = event.partition_key();

        channel.fail_next(2).await;
        assert!(channel.publish(&key, &event).await.is_err());
        assert!(channel.publish(&key, &event).await.is_err());
        assert!(channel.publish(&key, &event).await.is_ok());
        assert_eq!(channel.len().await, 1);
    }

    #[tokio::test]
    async fn test_fail_all() {
        let channel = InMemoryEventChannel::new();
        let event = OrderEvent::for_order(&order(), EventType::Created);

        channel.set_fail_all(true).await;
        assert!(matches!(
            channel.publish(&event.partition_key(), &event).await,
            Err(ChannelError::Unavailable(_))
        ));
        assert!(channel.is_empty().await);

        channel.set_fail_all(false).await;
        channel.publish(&event.partition_key(), &event).await.unwrap();
        assert_eq!(channel.len().await, 1);
    }
}
