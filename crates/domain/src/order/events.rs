//! Order lifecycle events.

use chrono::{DateTime, Utc};
use common::{OrderId, OwnerId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Money, Order, OrderStatus};

/// Unique identifier for a constructed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of transition an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The order was created (absent -> PENDING).
    #[serde(rename = "ORDER_CREATED")]
    Created,

    /// The order status was changed through a status update.
    #[serde(rename = "ORDER_STATUS_UPDATED")]
    StatusUpdated,

    /// The order was cancelled.
    #[serde(rename = "ORDER_CANCELLED")]
    Cancelled,
}

impl EventType {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "ORDER_CREATED",
            EventType::StatusUpdated => "ORDER_STATUS_UPDATED",
            EventType::Cancelled => "ORDER_CANCELLED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_CREATED" => Ok(EventType::Created),
            "ORDER_STATUS_UPDATED" => Ok(EventType::StatusUpdated),
            "ORDER_CANCELLED" => Ok(EventType::Cancelled),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Key consumers deduplicate redeliveries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub order_id: OrderId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable fact describing the state an order reached.
///
/// The event carries the resulting state, not a diff. `occurred_at` is the
/// commit time of the transition, so publishing the same transition twice
/// yields the same dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub order_id: OrderId,
    pub owner_id: OwnerId,
    pub status: OrderStatus,
    pub total_amount: Money,
    /// Order version after the transition; strictly increasing per order.
    pub sequence: Version,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Builds the event for a committed order state.
    pub fn for_order(order: &Order, event_type: EventType) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            order_id: order.id(),
            owner_id: order.owner_id(),
            status: order.status(),
            total_amount: order.total_amount(),
            sequence: order.version(),
            occurred_at: order.updated_at(),
        }
    }

    /// Returns the channel partition key; all events of one order share it.
    pub fn partition_key(&self) -> String {
        self.order_id.to_string()
    }

    /// Returns the consumer deduplication key.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            order_id: self.order_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
        }
    }
}
