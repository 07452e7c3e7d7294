//! Bounded record of platform event ids that have already been handled.
//!
//! The platform redelivers events it considers unacknowledged, so the same
//! `event_id` can arrive more than once, sometimes concurrently.

use indexmap::IndexSet;
use std::sync::Mutex;
use tracing::debug;

pub const DEFAULT_MAX_PROCESSED_EVENTS: usize = 10_000;

pub struct EventDeduplicator {
    seen: Mutex<IndexSet<String>>,
    capacity: usize,
}

impl EventDeduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(IndexSet::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Record `event_id` and report whether it is new.
    ///
    /// Check and insert happen under one lock, so two concurrent deliveries
    /// of the same event cannot both return `true`. Eviction is FIFO by
    /// insertion; a hit does not refresh an entry's position.
    pub fn should_process(&self, event_id: &str) -> bool {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if seen.contains(event_id) {
            debug!("duplicate event: {}", event_id);
            return false;
        }
        seen.insert(event_id.to_string());
        if seen.len() > self.capacity {
            seen.shift_remove_index(0);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROCESSED_EVENTS)
    }
}
