//! The order lifecycle engine.

use std::future::Future;
use std::time::Instant;

use cache::OrderCache;
use channel::EventChannel;
use common::{OrderId, OwnerId, Version};
use domain::{EventType, Order, OrderDraft, OrderEvent, OrderStatus, StatusChange};
use order_store::{Committed, OrderStore, OutboxEntry, StoreError, WriteOptions};

use crate::error::{LifecycleError, PublishError, Result, SideEffectWarning};
use crate::relay::OutboxRelay;
use crate::retry::{retry_with_backoff, within};
use crate::{CachePolicy, CreateOrder, LifecycleConfig, PublishMode};

/// Result of a successful mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The order as committed.
    pub order: Order,

    /// Post-commit side effects that failed. The mutation stands.
    pub warnings: Vec<SideEffectWarning>,

    /// True when a create was answered from an earlier request with the
    /// same idempotency key.
    pub replayed: bool,
}

impl MutationOutcome {
    /// Returns true if every side effect succeeded.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Coordinates the store, the cache and the event channel for orders.
///
/// Mutations run persist, then cache, then publish. Only the store write
/// carries a concurrency token; the cache and publish steps hold no lock
/// and never roll the write back.
pub struct OrderLifecycle<S, C, P>
where
    S: OrderStore,
    C: OrderCache,
    P: EventChannel,
{
    store: S,
    cache: C,
    channel: P,
    config: LifecycleConfig,
}

impl<S, C, P> OrderLifecycle<S, C, P>
where
    S: OrderStore,
    C: OrderCache,
    P: EventChannel,
{
    /// Creates an engine with the default configuration.
    pub fn new(store: S, cache: C, channel: P) -> Self {
        Self::with_config(store, cache, channel, LifecycleConfig::default())
    }

    pub fn with_config(store: S, cache: C, channel: P, config: LifecycleConfig) -> Self {
        Self {
            store,
            cache,
            channel,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn channel(&self) -> &P {
        &self.channel
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Builds a relay draining the outbox of this engine's store.
    pub fn outbox_relay(&self) -> OutboxRelay<S, P>
    where
        S: Clone,
        P: Clone,
    {
        OutboxRelay::new(self.store.clone(), self.channel.clone(), self.config.clone())
    }

    /// Creates a new `PENDING` order and announces it.
    ///
    /// Fails with `Validation` before anything is written if the lines are
    /// empty or invalid. Replaying an idempotency key with a different owner
    /// or lines is also `Validation`. A store timeout yields `Indeterminate`;
    /// retry only with the same idempotency key.
    #[tracing::instrument(skip(self, command), fields(owner_id = %command.owner_id))]
    pub async fn create(&self, command: CreateOrder) -> Result<MutationOutcome> {
        let start = Instant::now();

        let mut draft = OrderDraft::new(command.owner_id, command.lines)?;
        if let Some(key) = command.idempotency_key {
            draft = draft.with_idempotency_key(key);
        }

        let request = draft.idempotency_key().is_some().then(|| draft.clone());

        let committed = self
            .store_write("create", self.store.create(draft, self.write_options(EventType::Created)))
            .await?;

        if committed.replayed {
            if let Some(request) = &request {
                request.check_replay(&committed.order)?;
            }
            return Ok(self.replay_create(committed).await);
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %committed.order.id(), total = %committed.order.total_amount(), "order created");

        let outcome = self.after_commit(committed, EventType::Created).await;
        record_duration("create", start);
        Ok(outcome)
    }

    /// Cache-aside read.
    ///
    /// A cache failure is treated as a miss. On a miss the store is read
    /// and the cache repopulated; a failed repopulation is ignored. If a
    /// write committed while the store was being read, the cache refuses the
    /// older snapshot because of the version floor the write left.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        match within(self.config.cache_timeout, self.cache.get(order_id)).await {
            Ok(Some(order)) => {
                metrics::counter!("order_cache_hits_total").increment(1);
                return Ok(order);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed, falling back to store");
            }
        }
        metrics::counter!("order_cache_misses_total").increment(1);

        let order = self
            .store_read("get_by_id", self.store.get_by_id(order_id))
            .await?
            .ok_or(LifecycleError::NotFound(order_id))?;

        if let Err(e) = within(self.config.cache_timeout, self.cache.put(&order)).await {
            tracing::debug!(error = %e, "cache repopulation failed");
        }

        Ok(order)
    }

    /// Lists the orders of one owner from the store, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>> {
        self.store_read("list_by_owner", self.store.list_by_owner(owner_id))
            .await
    }

    /// Lists every order from the store, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.store_read("list_all", self.store.list_all()).await
    }

    /// Moves an order to a direct successor of its current status.
    ///
    /// Emits `ORDER_STATUS_UPDATED`, also when the target is `CANCELLED`.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<MutationOutcome> {
        let start = Instant::now();
        let current = self.load_current(order_id).await?;
        let change = current.plan_transition(target)?;

        let outcome = self
            .commit_change(&current, change, EventType::StatusUpdated)
            .await?;
        record_duration("change_status", start);
        Ok(outcome)
    }

    /// Cancels an order. Shipped and delivered orders cannot be cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<MutationOutcome> {
        let start = Instant::now();
        let current = self.load_current(order_id).await?;
        let change = current.plan_cancel()?;

        let outcome = self
            .commit_change(&current, change, EventType::Cancelled)
            .await?;
        record_duration("cancel", start);
        Ok(outcome)
    }

    /// Reads the current state from the store, never from the cache.
    async fn load_current(&self, order_id: OrderId) -> Result<Order> {
        self.store_read("get_by_id", self.store.get_by_id(order_id))
            .await?
            .ok_or(LifecycleError::NotFound(order_id))
    }

    async fn commit_change(
        &self,
        current: &Order,
        change: StatusChange,
        event_type: EventType,
    ) -> Result<MutationOutcome> {
        let write = self.store.conditional_update(
            current.id(),
            current.version(),
            change,
            self.write_options(event_type),
        );

        let committed = match self.store_write("conditional_update", write).await {
            Ok(committed) => committed,
            Err(err @ LifecycleError::Conflict { .. }) => {
                metrics::counter!("order_conflicts_total").increment(1);
                tracing::info!(error = %err, "lost concurrent update");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        metrics::counter!(
            "order_transitions_total",
            "from" => change.from.as_str(),
            "to" => change.to.as_str()
        )
        .increment(1);
        tracing::info!(
            order_id = %current.id(),
            from = %change.from,
            to = %change.to,
            version = %committed.order.version(),
            "order status changed"
        );

        Ok(self.after_commit(committed, event_type).await)
    }

    /// Runs the cache step and then the publish step of a committed write.
    async fn after_commit(&self, committed: Committed, event_type: EventType) -> MutationOutcome {
        let mut warnings = Vec::new();

        if let Err(warning) = self.sync_cache(&committed.order).await {
            warnings.push(warning);
        }

        let publish = match (self.config.publish_mode, committed.outbox_entry) {
            (PublishMode::Outbox, Some(entry)) => self.publish_outbox_entry(entry).await,
            _ => {
                let event = OrderEvent::for_order(&committed.order, event_type);
                self.publish(&event, false).await
            }
        };
        if let Err(e) = publish {
            warnings.push(SideEffectWarning::Publish(e));
        }

        for warning in &warnings {
            metrics::counter!("order_side_effect_failures_total").increment(1);
            tracing::warn!(order_id = %committed.order.id(), warning = %warning, "side effect failed after commit");
        }

        MutationOutcome {
            order: committed.order,
            warnings,
            replayed: false,
        }
    }

    /// Answers a create whose idempotency key was already used.
    ///
    /// Nothing is written. In direct mode the creation event is published
    /// again while the order is untouched, covering a publish lost after an
    /// indeterminate first attempt; consumers see the same dedup key.
    async fn replay_create(&self, committed: Committed) -> MutationOutcome {
        let order = committed.order;
        tracing::info!(order_id = %order.id(), "create replayed from idempotency key");

        let mut warnings = Vec::new();
        if self.config.publish_mode == PublishMode::Direct
            && order.version() == Version::first()
        {
            let event = OrderEvent::for_order(&order, EventType::Created);
            if let Err(e) = self.publish(&event, false).await {
                warnings.push(SideEffectWarning::Publish(e));
            }
        }

        MutationOutcome {
            order,
            warnings,
            replayed: true,
        }
    }

    async fn sync_cache(&self, order: &Order) -> std::result::Result<(), SideEffectWarning> {
        let policy = self.config.cache_policy;
        let limit = self.config.cache_timeout;

        retry_with_backoff(&self.config.retry, "cache", move || {
            within(limit, async move {
                match policy {
                    CachePolicy::Invalidate => {
                        self.cache.invalidate(order.id(), order.version()).await
                    }
                    CachePolicy::WriteThrough => self.cache.put(order).await,
                }
            })
        })
        .await
        .map_err(|e| SideEffectWarning::Cache {
            order_id: order.id(),
            reason: e.to_string(),
        })
    }

    async fn publish(
        &self,
        event: &OrderEvent,
        pending_in_outbox: bool,
    ) -> std::result::Result<(), PublishError> {
        let key = event.partition_key();
        let key = key.as_str();
        let limit = self.config.publish_timeout;

        retry_with_backoff(&self.config.retry, "publish", move || {
            within(limit, self.channel.publish(key, event))
        })
        .await
        .map_err(|e| PublishError {
            order_id: event.order_id,
            event_type: event.event_type,
            attempts: self.config.retry.max_attempts.max(1),
            reason: e.to_string(),
            pending_in_outbox,
        })?;

        metrics::counter!("order_events_published_total", "event_type" => event.event_type.as_str())
            .increment(1);
        tracing::debug!(event_type = %event.event_type, sequence = %event.sequence, "event published");
        Ok(())
    }

    async fn publish_outbox_entry(
        &self,
        entry: OutboxEntry,
    ) -> std::result::Result<(), PublishError> {
        self.publish(&entry.event, true).await?;

        // The relay will publish the entry again if this fails; consumers
        // dedup the second delivery.
        if let Err(e) = within(self.config.store_timeout, self.store.mark_published(entry.id)).await {
            tracing::warn!(entry_id = entry.id, error = %e, "failed to mark outbox entry published");
        }
        Ok(())
    }

    fn write_options(&self, event_type: EventType) -> WriteOptions {
        match self.config.publish_mode {
            PublishMode::Direct => WriteOptions::new(),
            PublishMode::Outbox => WriteOptions::with_outbox(event_type),
        }
    }

    /// Bounds a store write. On timeout the outcome is unknown.
    async fn store_write<T>(
        &self,
        operation: &'static str,
        write: impl Future<Output = order_store::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, write).await {
            Ok(result) => result.map_err(LifecycleError::from),
            Err(_) => {
                tracing::error!(operation, "store write timed out, outcome unknown");
                Err(LifecycleError::Indeterminate { operation })
            }
        }
    }

    async fn store_read<T>(
        &self,
        operation: &'static str,
        read: impl Future<Output = order_store::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, read).await {
            Ok(result) => result.map_err(LifecycleError::from),
            Err(_) => Err(StoreError::Timeout { operation }.into()),
        }
    }
}

fn record_duration(command: &'static str, start: Instant) {
    metrics::histogram!("order_command_duration_seconds", "command" => command)
        .record(start.elapsed().as_secs_f64());
}
