//! Outbox relay.
//!
//! Drains events recorded in the store's outbox to the channel. Entries
//! are published in recording order; once an entry of an order fails, later
//! entries of that order wait for the next pass so per-order publish order
//! holds.

use std::collections::HashSet;

use channel::EventChannel;
use common::OrderId;
use order_store::{OrderStore, StoreError};
use tokio::sync::watch;

use crate::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::retry::within;

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    /// Entries held back behind a failed entry of the same order.
    pub deferred: usize,
}

/// Background publisher for outbox entries.
pub struct OutboxRelay<S, P>
where
    S: OrderStore,
    P: EventChannel,
{
    store: S,
    channel: P,
    config: LifecycleConfig,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OrderStore,
    P: EventChannel,
{
    pub fn new(store: S, channel: P, config: LifecycleConfig) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    /// Publishes one batch of pending entries.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayReport> {
        let pending = match tokio::time::timeout(
            self.config.store_timeout,
            self.store.pending_outbox(self.config.outbox_batch_size),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(LifecycleError::Store(StoreError::Timeout {
                    operation: "pending_outbox",
                }));
            }
        };

        let mut report = RelayReport::default();
        let mut blocked: HashSet<OrderId> = HashSet::new();

        for entry in pending {
            let order_id = entry.event.order_id;
            if blocked.contains(&order_id) {
                report.deferred += 1;
                continue;
            }

            let key = entry.event.partition_key();
            match within(
                self.config.publish_timeout,
                self.channel.publish(&key, &entry.event),
            )
            .await
            {
                Ok(()) => {
                    // An unmarked entry is published again on the next pass.
                    if let Err(e) =
                        within(self.config.store_timeout, self.store.mark_published(entry.id))
                            .await
                    {
                        tracing::warn!(
                            entry_id = entry.id,
                            error = %e,
                            "failed to mark outbox entry published"
                        );
                    }
                    metrics::counter!("outbox_relayed_total").increment(1);
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        entry_id = entry.id,
                        order_id = %order_id,
                        event_type = %entry.event.event_type,
                        error = %e,
                        "outbox publish failed, will retry"
                    );
                    blocked.insert(order_id);
                    report.failed += 1;
                }
            }
        }

        if report.published > 0 || report.failed > 0 {
            tracing::debug!(?report, "outbox relay pass finished");
        }
        Ok(report)
    }

    /// Polls the outbox until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.outbox_poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_ms = self.config.outbox_poll_interval.as_millis() as u64,
            "outbox relay started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "outbox relay pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox relay stopped");
    }
}
