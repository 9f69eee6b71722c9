//! Fixed-window counter limiter.

use std::time::Duration;
use tracing::debug;

use super::backend::Limiter;
use super::client::ClientId;
use super::clock::Timestamp;
use super::limiter::{Algorithm, LimitConfig};
use super::registry::LimiterRegistry;
use super::verdict::Verdict;

/// Per-client state for the fixed-window algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowState {
    /// Requests observed in the current window, denied ones included
    pub count: u64,
    /// When the current window began
    pub window_start: Timestamp,
}

/// A limiter that counts requests per client and resets the count when a
/// fixed-length window has elapsed since the client's first request in it.
///
/// O(1) memory per client. A client can send `max_requests` at the end of
/// one window and `max_requests` more right after it rolls over.
///
/// Denied requests still increment the counter; it only resets on rollover.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: LimitConfig,
    idle_ttl: Duration,
    registry: LimiterRegistry<FixedWindowState>,
}

impl FixedWindowLimiter {
    /// Create a fixed-window limiter with the default idle TTL.
    pub fn new(limit: LimitConfig) -> Self {
        Self::with_idle_ttl(limit, limit.default_idle_ttl())
    }

    /// Create a fixed-window limiter that evicts clients idle for `idle_ttl`.
    pub fn with_idle_ttl(limit: LimitConfig, idle_ttl: Duration) -> Self {
        Self {
            limit,
            idle_ttl,
            registry: LimiterRegistry::new(),
        }
    }

    /// Decide whether to admit a request from `id` at `now`.
    pub fn decide(&self, id: &ClientId, now: Timestamp) -> Verdict {
        let window_ms = self.limit.window_ms();
        let max_requests = self.limit.max_requests;

        let (verdict, count) = self.registry.with_state(
            id,
            now,
            || FixedWindowState {
                count: 1,
                window_start: now,
            },
            |state, created| {
                if created {
                    return (Verdict::Allow, state.count);
                }

                if now.saturating_sub(state.window_start) < window_ms {
                    state.count = state.count.saturating_add(1);
                    if state.count > max_requests {
                        return (Verdict::Deny { retry_after: None }, state.count);
                    }
                } else {
                    state.count = 1;
                    state.window_start = now;
                }
                (Verdict::Allow, state.count)
            },
        );

        if !verdict.is_allowed() {
            debug!(
                client = %id,
                count = count,
                limit = max_requests,
                "Fixed window limit exceeded"
            );
        }
        verdict
    }

    /// Copy of the state for `id`, if tracked.
    pub fn state(&self, id: &ClientId) -> Option<FixedWindowState> {
        self.registry.get(id)
    }

    /// Copy of every client's state, ordered by identifier.
    pub fn snapshot(&self) -> Vec<(ClientId, FixedWindowState)> {
        self.registry.snapshot()
    }

    /// The configured limit.
    pub fn limit(&self) -> LimitConfig {
        self.limit
    }
}

impl Limiter for FixedWindowLimiter {
    fn decide(&self, id: &ClientId, now: Timestamp) -> Verdict {
        FixedWindowLimiter::decide(self, id, now)
    }

    fn sweep(&self, now: Timestamp) -> usize {
        self.registry.sweep(now, self.idle_ttl)
    }

    fn tracked_clients(&self) -> usize {
        self.registry.len()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }
}
