//! Limit configuration and limiter construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::backend::Limiter;
use super::fixed_window::FixedWindowLimiter;
use super::sliding_window::SlidingWindowLimiter;
use crate::error::{Result, TollgateError};

/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default number of requests admitted per window.
const DEFAULT_MAX_REQUESTS: u64 = 5;
/// Idle clients are evicted after this many window lengths by default.
const DEFAULT_IDLE_WINDOWS: u32 = 2;

/// Which windowing algorithm a limiter uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Counter reset at fixed window boundaries. Allows boundary bursts.
    FixedWindow,
    /// Exact timestamp log over a trailing window.
    #[default]
    SlidingWindow,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::FixedWindow => f.write_str("fixed-window"),
            Algorithm::SlidingWindow => f.write_str("sliding-window"),
        }
    }
}

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Length of the window
    pub window: Duration,
    /// Maximum requests admitted per window
    pub max_requests: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl LimitConfig {
    /// Create a limit of `max_requests` per `window`.
    pub fn new(window: Duration, max_requests: u64) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    /// Reject limits that could never admit a request.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms() == 0 {
            return Err(TollgateError::Config(
                "window must be at least one millisecond".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TollgateError::Config(
                "max_requests must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis().min(u64::MAX as u128) as u64
    }

    /// Idle TTL used when none is configured.
    pub fn default_idle_ttl(&self) -> Duration {
        self.window.saturating_mul(DEFAULT_IDLE_WINDOWS)
    }
}

/// Build a limiter for `algorithm`.
///
/// `idle_ttl` of `None` falls back to [`LimitConfig::default_idle_ttl`].
pub fn build_limiter(
    algorithm: Algorithm,
    limit: LimitConfig,
    idle_ttl: Option<Duration>,
) -> Result<Arc<dyn Limiter>> {
    limit.validate()?;
    let idle_ttl = idle_ttl.unwrap_or_else(|| limit.default_idle_ttl());

    info!(
        algorithm = %algorithm,
        window_ms = limit.window_ms(),
        max_requests = limit.max_requests,
        idle_ttl_ms = idle_ttl.as_millis() as u64,
        "Building rate limiter"
    );

    let limiter: Arc<dyn Limiter> = match algorithm {
        Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::with_idle_ttl(limit, idle_ttl)),
        Algorithm::SlidingWindow => {
            Arc::new(SlidingWindowLimiter::with_idle_ttl(limit, idle_ttl))
        }
    };
    Ok(limiter)
}
