use thiserror::Error;

use crate::{OrderId, Version};

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The conditional write lost: the stored version moved on.
    #[error(
        "Version conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The order was not found in the store.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A store call did not complete within its deadline.
    #[error("Store {operation} timed out")]
    Timeout { operation: &'static str },

    /// A persisted record could not be turned back into an order.
    #[error("Corrupt record for order {order_id}: {reason}")]
    Corrupt { order_id: OrderId, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
