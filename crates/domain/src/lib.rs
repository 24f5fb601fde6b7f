//! Domain layer for the order lifecycle system.
//!
//! This crate holds the pure order model:
//! - `Order` aggregate with its immutable lines and derived total
//! - `OrderStatus` transition graph
//! - `OrderEvent` facts announced for every committed transition
//!
//! Nothing in here performs I/O; storage, caching and publication live in
//! their own crates.

pub mod order;

pub use common::{OrderId, OwnerId, Version};
pub use order::{
    DedupKey, EventId, EventType, Money, Order, OrderDraft, OrderError, OrderEvent, OrderLine,
    OrderParts, OrderStatus, ProductId, StatusChange, UnknownStatus,
};
