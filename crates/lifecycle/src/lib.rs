//! Order lifecycle engine.
//!
//! The engine owns the status graph of an order and coordinates the three
//! collaborators around every mutation: the store is written first, then
//! the cache entry is invalidated (or replaced), then the event is
//! published. Post-commit failures never undo the write; they come back to
//! the caller as warnings.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod relay;
pub mod retry;

pub use command::CreateOrder;
pub use config::{CachePolicy, LifecycleConfig, PublishMode};
pub use engine::{MutationOutcome, OrderLifecycle};
pub use error::{LifecycleError, PublishError, Result, SideEffectWarning};
pub use relay::{OutboxRelay, RelayReport};
pub use retry::{RetryConfig, retry_with_backoff};
