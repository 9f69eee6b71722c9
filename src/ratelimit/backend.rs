//! Limiter trait for abstracting over the windowing algorithms.

use super::client::ClientId;
use super::clock::Timestamp;
use super::limiter::Algorithm;
use super::verdict::Verdict;

/// Trait for admission decision engines.
///
/// This trait abstracts over the fixed-window and sliding-window limiters
/// so the HTTP middleware and the eviction sweeper can work with either.
/// `decide` never blocks on I/O and never suspends.
pub trait Limiter: Send + Sync {
    /// Record a request from `id` at `now` and decide whether to admit it.
    fn decide(&self, id: &ClientId, now: Timestamp) -> Verdict;

    /// Drop clients idle past the configured TTL. Returns how many were removed.
    fn sweep(&self, now: Timestamp) -> usize;

    /// Number of clients currently holding state.
    fn tracked_clients(&self) -> usize;

    /// The algorithm this limiter implements.
    fn algorithm(&self) -> Algorithm;
}
