//! Lifecycle error types.

use common::OrderId;
use domain::{EventType, OrderError, OrderStatus};
use order_store::{StoreError, Version};
use thiserror::Error;

/// Errors returned by lifecycle operations.
///
/// Every variant means the operation did not take effect, except
/// `Indeterminate`, where the store write may or may not have committed.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Bad input; nothing was written.
    #[error("Validation failed: {0}")]
    Validation(OrderError),

    /// No order with this id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The requested status is not a direct successor of the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Another writer committed first. Re-read and retry.
    #[error("Order {order_id} was modified concurrently: expected version {expected}, found {actual}")]
    Conflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The store write timed out; the outcome is unknown. Re-read before
    /// retrying, and never resend a create without an idempotency key.
    #[error("Outcome of {operation} is unknown: the store did not answer in time")]
    Indeterminate { operation: &'static str },

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    /// Stable identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "VALIDATION",
            LifecycleError::NotFound(_) => "NOT_FOUND",
            LifecycleError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LifecycleError::Conflict { .. } => "CONFLICT",
            LifecycleError::Indeterminate { .. } => "INDETERMINATE",
            LifecycleError::Store(_) => "STORE",
        }
    }
}

impl From<OrderError> for LifecycleError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => {
                LifecycleError::InvalidTransition { from, to }
            }
            other => LifecycleError::Validation(other),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(order_id) => LifecycleError::NotFound(order_id),
            StoreError::VersionConflict {
                order_id,
                expected,
                actual,
            } => LifecycleError::Conflict {
                order_id,
                expected,
                actual,
            },
            other => LifecycleError::Store(other),
        }
    }
}

/// An event that could not be published after all retries.
///
/// The state change it describes is committed regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to publish {event_type} for order {order_id} after {attempts} attempt(s): {reason}")]
pub struct PublishError {
    pub order_id: OrderId,
    pub event_type: EventType,
    pub attempts: u32,
    pub reason: String,
    /// True when the event is kept in the outbox and will be relayed later.
    pub pending_in_outbox: bool,
}

/// A post-commit side effect that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SideEffectWarning {
    /// The cache entry could not be invalidated or replaced. It may serve
    /// the previous state until it expires.
    #[error("Cache update for order {order_id} failed: {reason}")]
    Cache { order_id: OrderId, reason: String },

    #[error(transparent)]
    Publish(PublishError),
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;
