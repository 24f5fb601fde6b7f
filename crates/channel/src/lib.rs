//! Event channel for order lifecycle events.
//!
//! Events of one order share a partition key and are delivered in publish
//! order. Delivery is at least once; consumers deduplicate on
//! [`domain::DedupKey`], see [`EventDeduplicator`].

pub mod dedup;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod traits;

pub use common::OrderId;
pub use dedup::EventDeduplicator;
pub use error::{ChannelError, Result};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventChannel, KafkaEventChannelConfig};
pub use memory::{InMemoryEventChannel, PublishedEvent};
pub use traits::{EventChannel, ORDER_EVENTS_TOPIC};
