//! Commands accepted by the lifecycle engine.

use common::OwnerId;
use domain::OrderLine;

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub owner_id: OwnerId,
    pub lines: Vec<OrderLine>,
    /// Caller supplied key making a retried create safe.
    pub idempotency_key: Option<String>,
}

impl CreateOrder {
    /// Creates a new CreateOrder command.
    pub fn new(owner_id: OwnerId, lines: Vec<OrderLine>) -> Self {
        Self {
            owner_id,
            lines,
            idempotency_key: None,
        }
    }

    /// Attaches an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
