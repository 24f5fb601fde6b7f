use cache::InMemoryOrderCache;
use channel::InMemoryEventChannel;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, OrderLine, OrderStatus};
use lifecycle::{CreateOrder, LifecycleConfig, OrderLifecycle, PublishMode};
use order_store::{InMemoryOrderStore, OwnerId};

type BenchEngine = OrderLifecycle<InMemoryOrderStore, InMemoryOrderCache, InMemoryEventChannel>;

fn engine(config: LifecycleConfig) -> BenchEngine {
    OrderLifecycle::with_config(
        InMemoryOrderStore::new(),
        InMemoryOrderCache::new(),
        InMemoryEventChannel::new(),
        config,
    )
}

fn lines() -> Vec<OrderLine> {
    vec![
        OrderLine::new("SKU-001", "Widget", 2, Money::from_cents(1000)),
        OrderLine::new("SKU-002", "Gadget", 1, Money::from_cents(500)),
    ]
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = engine(LifecycleConfig::default());

    c.bench_function("lifecycle/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .create(CreateOrder::new(OwnerId::new(), lines()))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_cached_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = engine(LifecycleConfig::default());
    let order_id = rt.block_on(async {
        let order = engine
            .create(CreateOrder::new(OwnerId::new(), lines()))
            .await
            .unwrap()
            .order;
        engine.get(order.id()).await.unwrap();
        order.id()
    });

    c.bench_function("lifecycle/get_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.get(order_id).await.unwrap();
            });
        });
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    for (name, mode) in [
        ("lifecycle/full_path_direct", PublishMode::Direct),
        ("lifecycle/full_path_outbox", PublishMode::Outbox),
    ] {
        let engine = engine(LifecycleConfig::default().with_publish_mode(mode));

        c.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let order = engine
                        .create(CreateOrder::new(OwnerId::new(), lines()))
                        .await
                        .unwrap()
                        .order;
                    for status in [
                        OrderStatus::Confirmed,
                        OrderStatus::Processing,
                        OrderStatus::Shipped,
                        OrderStatus::Delivered,
                    ] {
                        engine.change_status(order.id(), status).await.unwrap();
                    }
                });
            });
        });
    }
}

criterion_group!(
    benches,
    bench_create_order,
    bench_cached_get,
    bench_full_lifecycle
);
criterion_main!(benches);
