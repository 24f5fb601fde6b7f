//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency. Tables are
//! truncated per test, so the tests are serialized.
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration
//! ```

use std::sync::Arc;

use domain::{EventType, Money, OrderDraft, OrderLine, OrderStatus, StatusChange};
use order_store::{
    OrderId, OrderStore, OrderStoreExt, OwnerId, PostgresOrderStore, StoreError, Version,
    WriteOptions,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_lines, orders, order_outbox")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn draft(owner_id: OwnerId) -> OrderDraft {
    OrderDraft::new(
        owner_id,
        vec![
            OrderLine::new("p1", "Keyboard", 2, Money::from_cents(1000)),
            OrderLine::new("p2", "Mouse", 1, Money::from_cents(500)),
        ],
    )
    .unwrap()
}

fn change(from: OrderStatus, to: OrderStatus) -> StatusChange {
    StatusChange { from, to }
}

#[tokio::test]
#[serial]
async fn create_and_load_order_with_lines() {
    let store = get_test_store().await;

    let committed = store
        .create(draft(OwnerId::new()), WriteOptions::new())
        .await
        .unwrap();
    let loaded = store.get_required(committed.order.id()).await.unwrap();

    assert_eq!(loaded, committed.order);
    assert_eq!(loaded.lines().len(), 2);
    assert_eq!(loaded.lines()[0].product_name, "Keyboard");
    assert_eq!(loaded.total_amount(), Money::from_cents(2500));
    assert_eq!(loaded.version(), Version::first());
    assert_eq!(loaded.status(), OrderStatus::Pending);
}

#[tokio::test]
#[serial]
async fn missing_order_is_none() {
    let store = get_test_store().await;
    assert!(store.get_by_id(OrderId::new()).await.unwrap().is_none());
    assert!(!store.exists(OrderId::new()).await.unwrap());
}

#[tokio::test]
#[serial]
async fn conditional_update_success() {
    let store = get_test_store().await;
    let created = store
        .create(draft(OwnerId::new()), WriteOptions::new())
        .await
        .unwrap();

    let updated = store
        .conditional_update(
            created.order.id(),
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Confirmed),
            WriteOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(updated.order.status(), OrderStatus::Confirmed);
    assert_eq!(updated.order.version(), Version::new(2));
    assert_eq!(updated.order.lines().len(), 2);

    let loaded = store.get_required(created.order.id()).await.unwrap();
    assert_eq!(loaded, updated.order);
}

#[tokio::test]
#[serial]
async fn back_to_back_updates_advance_updated_at() {
    let store = get_test_store().await;
    let created = store
        .create(draft(OwnerId::new()), WriteOptions::new())
        .await
        .unwrap();
    let id = created.order.id();

    let steps = [
        (OrderStatus::Pending, OrderStatus::Confirmed),
        (OrderStatus::Confirmed, OrderStatus::Processing),
        (OrderStatus::Processing, OrderStatus::Shipped),
    ];
    let mut previous = created.order;
    for (from, to) in steps {
        let updated = store
            .conditional_update(id, previous.version(), change(from, to), WriteOptions::new())
            .await
            .unwrap();
        assert!(updated.order.updated_at() > previous.updated_at());
        previous = updated.order;
    }
}

#[tokio::test]
#[serial]
async fn conditional_update_conflict() {
    let store = get_test_store().await;
    let created = store
        .create(draft(OwnerId::new()), WriteOptions::new())
        .await
        .unwrap();
    let id = created.order.id();

    store
        .conditional_update(
            id,
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Confirmed),
            WriteOptions::new(),
        )
        .await
        .unwrap();

    let result = store
        .conditional_update(
            id,
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Cancelled),
            WriteOptions::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(StoreError::VersionConflict { actual, .. }) if actual == Version::new(2)
    ));
    let loaded = store.get_required(id).await.unwrap();
    assert_eq!(loaded.status(), OrderStatus::Confirmed);
}

#[tokio::test]
#[serial]
async fn concurrent_updates_commit_exactly_once() {
    let store = get_test_store().await;
    let created = store
        .create(draft(OwnerId::new()), WriteOptions::new())
        .await
        .unwrap();
    let id = created.order.id();

    let a = store.clone();
    let b = store.clone();
    let (first, second) = tokio::join!(
        a.conditional_update(
            id,
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Confirmed),
            WriteOptions::new(),
        ),
        b.conditional_update(
            id,
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Cancelled),
            WriteOptions::new(),
        ),
    );

    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(
        store.get_required(id).await.unwrap().version(),
        Version::new(2)
    );
}

#[tokio::test]
#[serial]
async fn conditional_update_unknown_order() {
    let store = get_test_store().await;
    let result = store
        .conditional_update(
            OrderId::new(),
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Confirmed),
            WriteOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn idempotency_key_replays_existing_order() {
    let store = get_test_store().await;
    let owner = OwnerId::new();

    let first = store
        .create(
            draft(owner).with_idempotency_key("req-42"),
            WriteOptions::with_outbox(EventType::Created),
        )
        .await
        .unwrap();
    let second = store
        .create(
            draft(owner).with_idempotency_key("req-42"),
            WriteOptions::with_outbox(EventType::Created),
        )
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert!(second.outbox_entry.is_none());
    assert_eq!(second.order.id(), first.order.id());
    assert_eq!(store.list_all().await.unwrap().len(), 1);
    assert_eq!(store.pending_outbox(10).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn list_by_owner_oldest_first() {
    let store = get_test_store().await;
    let alice = OwnerId::new();
    let bob = OwnerId::new();

    let first = store.create(draft(alice), WriteOptions::new()).await.unwrap();
    store.create(draft(bob), WriteOptions::new()).await.unwrap();
    let second = store.create(draft(alice), WriteOptions::new()).await.unwrap();

    let orders = store.list_by_owner(alice).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id(), first.order.id());
    assert_eq!(orders[1].id(), second.order.id());
    assert_eq!(orders[0].lines().len(), 2);

    assert!(store.list_by_owner(OwnerId::new()).await.unwrap().is_empty());
    assert_eq!(store.list_all().await.unwrap().len(), 3);
}

#[tokio::test]
#[serial]
async fn outbox_entries_round_trip() {
    let store = get_test_store().await;
    let created = store
        .create(
            draft(OwnerId::new()),
            WriteOptions::with_outbox(EventType::Created),
        )
        .await
        .unwrap();
    store
        .conditional_update(
            created.order.id(),
            Version::first(),
            change(OrderStatus::Pending, OrderStatus::Cancelled),
            WriteOptions::with_outbox(EventType::Cancelled),
        )
        .await
        .unwrap();

    let pending = store.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].event.event_type, EventType::Created);
    assert_eq!(pending[1].event.event_type, EventType::Cancelled);
    assert_eq!(pending[1].event.sequence, Version::new(2));
    assert_eq!(Some(&pending[0]), created.outbox_entry.as_ref());

    // Reloaded events keep the dedup key of the committed transition.
    let reloaded = store.get_required(created.order.id()).await.unwrap();
    assert_eq!(pending[1].event.occurred_at, reloaded.updated_at());

    store.mark_published(pending[0].id).await.unwrap();
    store.mark_published(pending[0].id).await.unwrap();
    let pending = store.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event.event_type, EventType::Cancelled);
}
