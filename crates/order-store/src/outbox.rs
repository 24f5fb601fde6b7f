//! Transactional outbox records.

use chrono::{DateTime, Utc};
use domain::OrderEvent;

/// An event recorded in the same atomic write as the state change it
/// describes, waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Store assigned position; pending entries are drained in this order.
    pub id: i64,

    /// The event to publish.
    pub event: OrderEvent,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}
