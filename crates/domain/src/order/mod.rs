//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderDraft, OrderParts, StatusChange};
pub use events::{DedupKey, EventId, EventType, OrderEvent};
pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::{Money, OrderLine, ProductId};

use thiserror::Error;

/// Errors raised by the order model.
///
/// Everything except `InvalidTransition` is an input validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// An order needs at least one line.
    #[error("Order must contain at least one line")]
    NoLines,

    /// A line has an empty product identifier.
    #[error("Line {index} has an empty product id")]
    MissingProductId { index: usize },

    /// A line has an empty product name.
    #[error("Line for product {product_id} has an empty product name")]
    MissingProductName { product_id: String },

    /// Quantity below one.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be at least 1)")]
    InvalidQuantity { product_id: String, quantity: i64 },

    /// Negative unit price.
    #[error("Invalid unit price for product {product_id}: {price_cents} cents (must not be negative)")]
    InvalidPrice { product_id: String, price_cents: i64 },

    /// The order total does not fit the money representation.
    #[error("Order total overflows the supported amount range")]
    AmountOverflow,

    /// An idempotency key was sent again with a different owner or lines.
    #[error("Idempotency key {key} was already used for a different order")]
    IdempotencyKeyReused { key: String },

    /// The requested status is not a direct successor of the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
