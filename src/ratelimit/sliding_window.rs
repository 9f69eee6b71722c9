//! Sliding-window log limiter.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::backend::Limiter;
use super::client::ClientId;
use super::clock::Timestamp;
use super::limiter::{Algorithm, LimitConfig};
use super::registry::LimiterRegistry;
use super::verdict::Verdict;

/// Per-client state for the sliding-window algorithm.
///
/// Holds one timestamp per admitted request still inside the trailing
/// window, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindowState {
    timestamps: VecDeque<Timestamp>,
}

impl SlidingWindowState {
    /// Admitted requests currently in the log.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The oldest admitted request still counted.
    pub fn oldest(&self) -> Option<Timestamp> {
        self.timestamps.front().copied()
    }

    /// Iterate over the logged timestamps, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.timestamps.iter().copied()
    }

    /// Drop entries at least `window_ms` older than `now`. Returns how many
    /// were dropped.
    ///
    /// The log is ordered, so compaction stops at the first live entry.
    fn prune(&mut self, now: Timestamp, window_ms: u64) -> usize {
        let mut removed = 0;
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_sub(*oldest) < window_ms {
                break;
            }
            self.timestamps.pop_front();
            removed += 1;
        }
        removed
    }
}

/// A limiter that logs every admitted request and counts the ones inside
/// the trailing window.
///
/// Exact: no more than `max_requests` admissions fall inside any window,
/// at the cost of memory proportional to the admissions in the window.
/// Denied requests are not logged and do not consume quota.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: LimitConfig,
    idle_ttl: Duration,
    registry: LimiterRegistry<SlidingWindowState>,
}

impl SlidingWindowLimiter {
    /// Create a sliding-window limiter with the default idle TTL.
    pub fn new(limit: LimitConfig) -> Self {
        Self::with_idle_ttl(limit, limit.default_idle_ttl())
    }

    /// Create a sliding-window limiter that evicts clients idle for `idle_ttl`.
    pub fn with_idle_ttl(limit: LimitConfig, idle_ttl: Duration) -> Self {
        Self {
            limit,
            idle_ttl,
            registry: LimiterRegistry::new(),
        }
    }

    /// Decide whether to admit a request from `id` at `now`.
    ///
    /// Denials carry the number of seconds, rounded up, until the oldest
    /// logged request leaves the window.
    pub fn decide(&self, id: &ClientId, now: Timestamp) -> Verdict {
        let window_ms = self.limit.window_ms();
        let max_requests = self.limit.max_requests;

        let (verdict, in_window) =
            self.registry
                .with_state(id, now, SlidingWindowState::default, |state, _| {
                    state.prune(now, window_ms);
                    let in_window = state.len() as u64;

                    if in_window >= max_requests {
                        let retry_after = retry_after_secs(state.oldest(), now, window_ms);
                        return (
                            Verdict::Deny {
                                retry_after: Some(retry_after),
                            },
                            in_window,
                        );
                    }

                    state.timestamps.push_back(now);
                    (Verdict::Allow, in_window + 1)
                });

        if let Verdict::Deny { retry_after } = verdict {
            debug!(
                client = %id,
                count = in_window,
                limit = max_requests,
                retry_after = ?retry_after,
                "Sliding window limit exceeded"
            );
        }
        verdict
    }

    /// Prune `id`'s log as of `now` without recording a request.
    ///
    /// Returns the number of requests left in the window, or `None` for an
    /// unknown client. Repeating the call at the same `now` is a no-op.
    pub fn prune(&self, id: &ClientId, now: Timestamp) -> Option<usize> {
        let window_ms = self.limit.window_ms();
        self.registry.with_existing(id, |state| {
            state.prune(now, window_ms);
            state.len()
        })
    }

    /// Copy of the state for `id`, if tracked.
    pub fn state(&self, id: &ClientId) -> Option<SlidingWindowState> {
        self.registry.get(id)
    }

    /// Copy of every client's state, ordered by identifier.
    pub fn snapshot(&self) -> Vec<(ClientId, SlidingWindowState)> {
        self.registry.snapshot()
    }

    /// The configured limit.
    pub fn limit(&self) -> LimitConfig {
        self.limit
    }
}

/// `ceil((window - (now - oldest)) / 1000)`.
///
/// Callers only deny with at least one request logged. An empty log would
/// mean the limit is zero; report a full window rather than fault.
fn retry_after_secs(oldest: Option<Timestamp>, now: Timestamp, window_ms: u64) -> u64 {
    debug_assert!(oldest.is_some(), "denied with an empty request log");
    let remaining_ms = match oldest {
        Some(oldest) => window_ms.saturating_sub(now.saturating_sub(oldest)),
        None => window_ms,
    };
    remaining_ms.div_ceil(1000)
}

impl Limiter for SlidingWindowLimiter {
    fn decide(&self, id: &ClientId, now: Timestamp) -> Verdict {
        SlidingWindowLimiter::decide(self, id, now)
    }

    fn sweep(&self, now: Timestamp) -> usize {
        self.registry.sweep(now, self.idle_ttl)
    }

    fn tracked_clients(&self) -> usize {
        self.registry.len()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(LimitConfig::new(Duration::from_millis(60_000), 5))
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn test_sixth_request_denied_and_capacity_frees_up() {
        let limiter = limiter();
        let id = ClientId::from("10.0.0.1");

        for t in [0, 10, 20, 30, 40] {
            assert_eq!(limiter.decide(&id, ts(t)), Verdict::Allow, "request at t={}", t);
        }
        assert_eq!(
            limiter.decide(&id, ts(50)),
            Verdict::Deny {
                retry_after: Some(60)
            }
        );

        assert_eq!(limiter.decide(&id, ts(60_001)), Verdict::Allow);
        let logged: Vec<u64> = limiter
            .state(&id)
            .unwrap()
            .timestamps()
            .map(|t| t.as_millis())
            .collect();
        assert_eq!(logged, vec![10, 20, 30, 40, 60_001]);
    }

    #[test]
    fn test_denied_requests_are_not_logged() {
        let limiter = limiter();
        let id = ClientId::from("a");

        for _ in 0..5 {
            limiter.decide(&id, ts(0));
        }
        for t in 1..20 {
            assert!(!limiter.decide(&id, ts(t)).is_allowed());
        }
        assert_eq!(limiter.state(&id).unwrap().len(), 5);
    }

    #[test]
    fn test_entry_expires_exactly_at_window_length() {
        let limiter = limiter();
        let id = ClientId::from("a");

        for _ in 0..5 {
            limiter.decide(&id, ts(1000));
        }
        assert_eq!(
            limiter.decide(&id, ts(60_999)),
            Verdict::Deny {
                retry_after: Some(1)
            }
        );
        assert_eq!(limiter.decide(&id, ts(61_000)), Verdict::Allow);
    }

    #[test]
    fn test_no_boundary_burst() {
        let limiter = limiter();
        let id = ClientId::from("bursty");

        limiter.decide(&id, ts(0));
        for _ in 0..4 {
            assert!(limiter.decide(&id, ts(59_990)).is_allowed());
        }
        // Only the t=0 entry has expired.
        assert!(limiter.decide(&id, ts(60_010)).is_allowed());
        assert!(!limiter.decide(&id, ts(60_010)).is_allowed());
    }

    #[test]
    fn test_retry_after_is_non_increasing() {
        let limiter = limiter();
        let id = ClientId::from("a");

        for t in [0, 5_000, 10_000, 15_000, 20_000] {
            limiter.decide(&id, ts(t));
        }

        let mut previous = u64::MAX;
        for t in (20_001..60_000).step_by(997) {
            let retry_after = limiter
                .decide(&id, ts(t))
                .retry_after()
                .expect("denied with retry-after");
            assert!(retry_after <= previous, "retry-after grew at t={}", t);
            previous = retry_after;
        }
    }

    #[test]
    fn test_window_never_holds_more_than_limit() {
        let limit = 3;
        let window = 1_000;
        let limiter = SlidingWindowLimiter::new(LimitConfig::new(
            Duration::from_millis(window),
            limit,
        ));
        let id = ClientId::from("a");

        // Irregular arrivals: clusters and gaps.
        let mut allowed = Vec::new();
        let mut t = 0u64;
        for i in 0..500u64 {
            t += (i * 7919) % 413;
            if limiter.decide(&id, ts(t)).is_allowed() {
                allowed.push(t);
            }
        }

        for &end in &allowed {
            let in_window = allowed
                .iter()
                .filter(|&&a| a <= end && end - a < window)
                .count() as u64;
            assert!(in_window <= limit, "{} admitted in window ending {}", in_window, end);
        }
    }

    #[test]
    fn test_prune_is_idempotent() {
        let limiter = limiter();
        let id = ClientId::from("a");

        for t in [0, 100, 30_000] {
            limiter.decide(&id, ts(t));
        }

        assert_eq!(limiter.prune(&id, ts(60_100)), Some(1));
        let first = limiter.state(&id).unwrap();
        assert_eq!(limiter.prune(&id, ts(60_100)), Some(1));
        assert_eq!(limiter.state(&id).unwrap(), first);
    }

    #[test]
    fn test_prune_unknown_client() {
        let limiter = limiter();
        assert_eq!(limiter.prune(&ClientId::from("nobody"), ts(0)), None);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_idle_client_keeps_empty_record_until_swept() {
        let limiter = SlidingWindowLimiter::with_idle_ttl(
            LimitConfig::new(Duration::from_millis(1000), 5),
            Duration::from_millis(3000),
        );
        let id = ClientId::from("a");
        limiter.decide(&id, ts(0));

        assert_eq!(limiter.prune(&id, ts(2000)), Some(0));
        assert_eq!(limiter.tracked_clients(), 1);

        assert_eq!(Limiter::sweep(&limiter, ts(3000)), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Some(ts(50)), ts(50), 60_000), 60);
        assert_eq!(retry_after_secs(Some(ts(0)), ts(50), 60_000), 60);
        assert_eq!(retry_after_secs(Some(ts(0)), ts(59_000), 60_000), 1);
        assert_eq!(retry_after_secs(Some(ts(0)), ts(59_001), 60_000), 1);
    }

    #[test]
    fn test_concurrent_decisions_never_double_allow() {
        let limiter = Arc::new(limiter());
        let id = ClientId::from("shared");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.decide(&id, ts(1)).is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 5);
        assert_eq!(limiter.state(&id).unwrap().len(), 5);
    }
}
