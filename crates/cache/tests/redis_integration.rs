//! Redis cache integration tests.
//!
//! Run with: cargo test -p cache --test redis_integration --features redis -- --ignored
//!
//! Requires: REDIS_URL env var or Redis on localhost:6379

use std::time::Duration;

use cache::{OrderCache, OrderId, RedisOrderCache};
use chrono::Utc;
use domain::{Money, OrderDraft, OrderLine, OrderStatus, OwnerId};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn order() -> domain::Order {
    OrderDraft::new(
        OwnerId::new(),
        vec![OrderLine::new("p1", "Desk", 1, Money::from_cents(19900))],
    )
    .unwrap()
    .into_order(OrderId::new(), Utc::now())
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_round_trip_and_invalidate() {
    let cache = RedisOrderCache::new(&redis_url(), Some(Duration::from_secs(60)))
        .await
        .expect("Failed to connect to Redis");
    let order = order();

    assert!(cache.get(order.id()).await.unwrap().is_none());

    cache.put(&order).await.unwrap();
    let cached = cache.get(order.id()).await.unwrap().unwrap();
    assert_eq!(cached, order);
    assert_eq!(cached.status(), OrderStatus::Pending);

    cache.invalidate(order.id(), order.version()).await.unwrap();
    assert!(cache.get(order.id()).await.unwrap().is_none());
    cache.invalidate(order.id(), order.version()).await.unwrap();
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_refuses_put_below_invalidated_version() {
    let cache = RedisOrderCache::new(&redis_url(), Some(Duration::from_secs(60)))
        .await
        .expect("Failed to connect to Redis");
    let v1 = order();
    let mut v2 = v1.clone();
    let change = v2.plan_transition(OrderStatus::Confirmed).unwrap();
    v2.apply_change(change, Utc::now());

    cache.invalidate(v1.id(), v2.version()).await.unwrap();
    cache.put(&v1).await.unwrap();
    assert!(cache.get(v1.id()).await.unwrap().is_none());

    cache.put(&v2).await.unwrap();
    let cached = cache.get(v1.id()).await.unwrap().unwrap();
    assert_eq!(cached.status(), OrderStatus::Confirmed);

    cache.put(&v1).await.unwrap();
    assert_eq!(cache.get(v1.id()).await.unwrap().unwrap().version(), v2.version());
}
