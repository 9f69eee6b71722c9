//! Background eviction of idle client state.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::backend::Limiter;
use super::clock::Clock;

/// Handle to a running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SweeperHandle {
    /// Stop the sweeper. Calling this more than once is harmless.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Eviction sweeper stopped");
        }
    }

    /// Whether the sweeper task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Spawn a task that calls [`Limiter::sweep`] every `period`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(
    limiter: Arc<dyn Limiter>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> SweeperHandle {
    info!(
        period_ms = period.as_millis() as u64,
        algorithm = %limiter.algorithm(),
        "Starting eviction sweeper"
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep(clock.now());
            debug!(
                removed = removed,
                tracked = limiter.tracked_clients(),
                "Eviction sweep finished"
            );
        }
    });

    SweeperHandle {
        task: Mutex::new(Some(task)),
    }
}
