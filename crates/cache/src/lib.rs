//! Order cache.
//!
//! The cache is an accelerator only. It never holds a state the store
//! hasn't committed, and callers treat every error from it as a miss.

pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use common::{OrderId, Version};
pub use error::{CacheError, Result};
pub use memory::InMemoryOrderCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisOrderCache;
pub use traits::{OrderCache, cache_key, floor_key};
