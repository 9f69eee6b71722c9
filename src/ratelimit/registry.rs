//! Per-client state storage shared by the limiters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::client::ClientId;
use super::clock::Timestamp;

/// A client's state together with the time it was last touched.
#[derive(Debug, Clone)]
struct Slot<S> {
    state: S,
    last_seen: Timestamp,
}

/// Owns every client's rate limit state.
///
/// Entries live in a sharded map. A decision holds its entry's shard lock
/// for the whole read-modify-write, so two decisions for the same client
/// are always serialized, while clients in other shards proceed in
/// parallel. No reference to a state escapes a single call.
#[derive(Debug)]
pub struct LimiterRegistry<S> {
    slots: DashMap<ClientId, Slot<S>>,
}

impl<S> LimiterRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Run `f` against the state for `id`, creating it with `init` if absent.
    ///
    /// `f` receives `true` as its second argument when the state was just
    /// created. The client's last-seen time is bumped to `now`.
    pub fn with_state<R>(
        &self,
        id: &ClientId,
        now: Timestamp,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S, bool) -> R,
    ) -> R {
        if let Some(mut slot) = self.slots.get_mut(id) {
            slot.last_seen = slot.last_seen.max(now);
            return f(&mut slot.state, false);
        }

        // Another caller may have inserted between the lookup above and here.
        match self.slots.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.last_seen = slot.last_seen.max(now);
                f(&mut slot.state, false)
            }
            Entry::Vacant(vacant) => {
                trace!(client = %id, "Creating client state");
                let mut slot = vacant.insert(Slot {
                    state: init(),
                    last_seen: now,
                });
                f(&mut slot.state, true)
            }
        }
    }

    /// Run `f` against an existing state without creating one or touching
    /// its last-seen time.
    pub fn with_existing<R>(&self, id: &ClientId, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.slots.get_mut(id).map(|mut slot| f(&mut slot.state))
    }

    /// Remove clients whose last decision is at least `idle_ttl` before `now`.
    ///
    /// Returns the number of clients removed.
    pub fn sweep(&self, now: Timestamp, idle_ttl: Duration) -> usize {
        let ttl_ms = idle_ttl.as_millis().min(u64::MAX as u128) as u64;
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now.saturating_sub(slot.last_seen) < ttl_ms);
        let removed = before.saturating_sub(self.slots.len());

        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.slots.len(),
                "Evicted idle clients"
            );
        }
        removed
    }

    /// Get the number of tracked clients.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clear all client state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

impl<S: Clone> LimiterRegistry<S> {
    /// Copy of the state for `id`, if tracked.
    pub fn get(&self, id: &ClientId) -> Option<S> {
        self.slots.get(id).map(|slot| slot.state.clone())
    }

    /// Copy of every client's state, ordered by identifier.
    pub fn snapshot(&self) -> Vec<(ClientId, S)> {
        let mut entries: Vec<(ClientId, S)> = self
            .slots
            .iter()
            .map(|slot| (slot.key().clone(), slot.value().state.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl<S> Default for LimiterRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
