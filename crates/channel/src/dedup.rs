use std::collections::HashSet;

use domain::{DedupKey, OrderEvent};

/// Consumer-side filter for redelivered events.
///
/// An event republished after a retry or an outbox replay carries a fresh
/// `event_id` but the same [`DedupKey`], so that key is what is tracked.
#[derive(Debug, Default)]
pub struct EventDeduplicator {
    seen: HashSet<DedupKey>,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the event and returns true the first time its key is seen.
    pub fn observe(&mut self, event: &OrderEvent) -> bool {
        self.seen.insert(event.dedup_key())
    }

    /// Keeps only the first delivery of each transition, in input order.
    pub fn filter<'a, I>(&mut self, events: I) -> Vec<OrderEvent>
    where
        I: IntoIterator<Item = &'a OrderEvent>,
    {
        events
            .into_iter()
            .filter(|e| self.observe(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
