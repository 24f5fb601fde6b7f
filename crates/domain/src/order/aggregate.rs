//! Order aggregate implementation.

use chrono::{DateTime, TimeDelta, Utc};
use common::{OrderId, OwnerId, Version};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderLine, OrderStatus};

/// A validated, not yet persisted order.
///
/// This is the only way to originate a new order: the store turns a draft
/// into an `Order` by assigning its id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    owner_id: OwnerId,
    lines: Vec<OrderLine>,
    total_amount: Money,
    idempotency_key: Option<String>,
}

impl OrderDraft {
    /// Validates the lines and computes the total.
    pub fn new(owner_id: OwnerId, lines: Vec<OrderLine>) -> Result<Self, OrderError> {
        let total_amount = validate_lines(&lines)?;
        Ok(Self {
            owner_id,
            lines,
            total_amount,
            idempotency_key: None,
        })
    }

    /// Attaches a caller supplied idempotency key.
    ///
    /// A store that has already seen the key returns the existing order
    /// instead of creating a second one.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Returns the owner of the order.
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Returns the order lines.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the computed total.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Returns the idempotency key, if any.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// Checks that `existing`, found under this draft's idempotency key, was
    /// created from the same owner and lines.
    pub fn check_replay(&self, existing: &Order) -> Result<(), OrderError> {
        let Some(key) = &self.idempotency_key else {
            return Ok(());
        };
        if existing.owner_id != self.owner_id || existing.lines != self.lines {
            return Err(OrderError::IdempotencyKeyReused { key: key.clone() });
        }
        Ok(())
    }

    /// Materializes the draft as a `PENDING` order at version 1.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            owner_id: self.owner_id,
            status: OrderStatus::Pending,
            lines: self.lines,
            total_amount: self.total_amount,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sums `quantity * unit_price` over valid lines.
fn validate_lines(lines: &[OrderLine]) -> Result<Money, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::NoLines);
    }

    let mut total = Money::zero();
    for (index, line) in lines.iter().enumerate() {
        if line.product_id.is_blank() {
            return Err(OrderError::MissingProductId { index });
        }
        if line.product_name.trim().is_empty() {
            return Err(OrderError::MissingProductName {
                product_id: line.product_id.to_string(),
            });
        }
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id.to_string(),
                quantity: i64::from(line.quantity),
            });
        }
        if line.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                product_id: line.product_id.to_string(),
                price_cents: line.unit_price.cents(),
            });
        }

        let subtotal = line.subtotal().ok_or(OrderError::AmountOverflow)?;
        total = total
            .checked_add(subtotal)
            .ok_or(OrderError::AmountOverflow)?;
    }

    Ok(total)
}

/// Raw persisted fields of an order, used by stores to rebuild it.
///
/// The total is not part of the parts: it is always recomputed from the
/// lines.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub owner_id: OwnerId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A planned status transition, validated against the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Status the order is in when the change was planned.
    pub from: OrderStatus,

    /// Status the order moves to.
    pub to: OrderStatus,
}

/// Order aggregate root.
///
/// Snapshots of this type are what the store returns, what the cache
/// mirrors and what callers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner_id: OwnerId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total_amount: Money,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    /// Rebuilds an order from persisted parts, recomputing its total.
    pub fn restore(parts: OrderParts) -> Result<Self, OrderError> {
        let total_amount = validate_lines(&parts.lines)?;
        Ok(Self {
            id: parts.id,
            owner_id: parts.owner_id,
            status: parts.status,
            lines: parts.lines,
            total_amount,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the sum of `quantity * unit_price` over all lines.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Returns the optimistic concurrency token.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the total quantity across lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }
}

// Transition methods
impl Order {
    /// Plans a move to `target`, which must be a direct successor.
    pub fn plan_transition(&self, target: OrderStatus) -> Result<StatusChange, OrderError> {
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        Ok(StatusChange {
            from: self.status,
            to: target,
        })
    }

    /// Plans a cancellation. Shipped and delivered orders cannot be cancelled.
    pub fn plan_cancel(&self) -> Result<StatusChange, OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }

        Ok(StatusChange {
            from: self.status,
            to: OrderStatus::Cancelled,
        })
    }

    /// Applies a committed change: new status, next version, new timestamp.
    ///
    /// `updated_at` always moves forward, by at least one microsecond, even
    /// if the clock stepped back. Two transitions of the same order never
    /// share an `occurred_at`.
    ///
    /// Stores call this only after the version check succeeded.
    pub fn apply_change(&mut self, change: StatusChange, at: DateTime<Utc>) {
        self.status = change.to;
        self.version = self.version.next();
        self.updated_at = at.max(self.updated_at + TimeDelta::microseconds(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{EventType, OrderEvent};

    fn lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new("p1", "Keyboard", 2, Money::from_cents(1000)),
            OrderLine::new("p2", "Mouse", 1, Money::from_cents(500)),
        ]
    }

    fn pending_order() -> Order {
        OrderDraft::new(OwnerId::new(), lines())
            .unwrap()
            .into_order(OrderId::new(), Utc::now())
    }

    #[test]
    fn test_draft_computes_total() {
        let draft = OrderDraft::new(OwnerId::new(), lines()).unwrap();
        assert_eq!(draft.total_amount(), Money::from_cents(2500));
    }

    #[test]
    fn test_draft_requires_lines() {
        assert_eq!(
            OrderDraft::new(OwnerId::new(), vec![]),
            Err(OrderError::NoLines)
        );
    }

    #[test]
    fn test_draft_rejects_zero_quantity() {
        let result = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("p1", "Keyboard", 0, Money::from_cents(1000))],
        );
        assert!(matches!(
            result,
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_draft_rejects_negative_price() {
        let result = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("p1", "Keyboard", 1, Money::from_cents(-1))],
        );
        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_draft_accepts_free_line() {
        let draft = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("gift", "Sticker", 3, Money::zero())],
        )
        .unwrap();
        assert_eq!(draft.total_amount(), Money::zero());
    }

    #[test]
    fn test_draft_rejects_blank_names() {
        let result = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("p1", " ", 1, Money::from_cents(100))],
        );
        assert!(matches!(result, Err(OrderError::MissingProductName { .. })));

        let result = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("", "Keyboard", 1, Money::from_cents(100))],
        );
        assert_eq!(result, Err(OrderError::MissingProductId { index: 0 }));
    }

    #[test]
    fn test_draft_rejects_overflowing_total() {
        let result = OrderDraft::new(
            OwnerId::new(),
            vec![OrderLine::new("p1", "Gold", u32::MAX, Money::from_cents(i64::MAX))],
        );
        assert_eq!(result, Err(OrderError::AmountOverflow));
    }

    #[test]
    fn test_check_replay_compares_owner_and_lines() {
        let owner = OwnerId::new();
        let draft = OrderDraft::new(owner, lines())
            .unwrap()
            .with_idempotency_key("req-1");
        let existing = draft.clone().into_order(OrderId::new(), Utc::now());
        assert_eq!(draft.check_replay(&existing), Ok(()));

        let other_owner = OrderDraft::new(OwnerId::new(), lines())
            .unwrap()
            .with_idempotency_key("req-1");
        assert_eq!(
            other_owner.check_replay(&existing),
            Err(OrderError::IdempotencyKeyReused {
                key: "req-1".to_string()
            })
        );

        let other_lines = OrderDraft::new(
            owner,
            vec![OrderLine::new("p1", "Keyboard", 5, Money::from_cents(1000))],
        )
        .unwrap()
        .with_idempotency_key("req-1");
        assert!(other_lines.check_replay(&existing).is_err());
    }

    #[test]
    fn test_into_order_starts_pending_at_first_version() {
        let order = pending_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.version(), Version::first());
        assert_eq!(order.created_at(), order.updated_at());
        assert_eq!(order.total_quantity(), 3);
    }

    #[test]
    fn test_plan_transition_follows_graph() {
        let order = pending_order();
        let change = order.plan_transition(OrderStatus::Confirmed).unwrap();
        assert_eq!(change.from, OrderStatus::Pending);
        assert_eq!(change.to, OrderStatus::Confirmed);

        assert_eq!(
            order.plan_transition(OrderStatus::Shipped),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            })
        );
    }

    #[test]
    fn test_apply_change_bumps_version() {
        let mut order = pending_order();
        let later = order.updated_at() + chrono::Duration::seconds(5);
        let change = order.plan_cancel().unwrap();

        order.apply_change(change, later);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.version(), Version::new(2));
        assert_eq!(order.updated_at(), later);
        assert!(order.plan_cancel().is_err());
    }

    #[test]
    fn test_apply_change_never_moves_time_backwards() {
        let mut order = pending_order();
        let created = order.updated_at();
        let earlier = created - chrono::Duration::seconds(1);

        let change = order.plan_transition(OrderStatus::Confirmed).unwrap();
        order.apply_change(change, earlier);
        let confirmed_at = order.updated_at();
        assert!(confirmed_at > created);
        let confirmed = OrderEvent::for_order(&order, EventType::StatusUpdated);

        // A second transition stamped with the same instant still advances.
        let change = order.plan_transition(OrderStatus::Processing).unwrap();
        order.apply_change(change, confirmed_at);
        assert!(order.updated_at() > confirmed_at);
        let processing = OrderEvent::for_order(&order, EventType::StatusUpdated);

        assert_ne!(confirmed.dedup_key(), processing.dedup_key());
    }

    #[test]
    fn test_plan_cancel_rejects_shipped_order() {
        let mut order = pending_order();
        for step in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            let change = order.plan_transition(step).unwrap();
            order.apply_change(change, Utc::now());
        }

        assert_eq!(
            order.plan_cancel(),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled,
            })
        );
    }

    #[test]
    fn test_restore_recomputes_total() {
        let original = pending_order();
        let restored = Order::restore(OrderParts {
            id: original.id(),
            owner_id: original.owner_id(),
            status: original.status(),
            lines: original.lines().to_vec(),
            version: original.version(),
            created_at: original.created_at(),
            updated_at: original.updated_at(),
        })
        .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_snapshot_serialization() {
        let order = pending_order();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
