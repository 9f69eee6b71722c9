//! Rate limiting logic and state management.

mod backend;
mod client;
mod clock;
mod fixed_window;
mod limiter;
mod registry;
mod sliding_window;
mod sweeper;
mod verdict;

pub use backend::Limiter;
pub use client::ClientId;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use fixed_window::{FixedWindowLimiter, FixedWindowState};
pub use limiter::{build_limiter, Algorithm, LimitConfig};
pub use registry::LimiterRegistry;
pub use sliding_window::{SlidingWindowLimiter, SlidingWindowState};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use verdict::Verdict;
