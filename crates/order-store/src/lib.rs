pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use common::{OrderId, OwnerId, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use outbox::OutboxEntry;
pub use postgres::PostgresOrderStore;
pub use store::{Committed, OrderStore, OrderStoreExt, WriteOptions};
