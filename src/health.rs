//! Reader-side liveness loop: periodically re-attempts ownership and, on
//! success, promotes the session from reader to owner. Grounded in the
//! teacher's `watcher/unified.rs` `tokio::time::interval`-driven task idiom,
//! adapted to call back into [`crate::session::SessionInner`] rather than
//! re-running a parse loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::session::SessionInner;
use crate::store::OwnershipArbiter;

/// Owns the background task that polls [`OwnershipArbiter::try_acquire`] on
/// a fixed interval. Dropping this without calling [`HealthMonitor::stop`]
/// leaves the task running; `SessionInner::close` always calls `stop`
/// explicitly so this is never relied upon.
pub(crate) struct HealthMonitor {
    task: tokio::task::JoinHandle<()>,
}

impl HealthMonitor {
    /// Starts the reader loop for `inner`. Only one should ever run at a
    /// time per session; `SessionInner` enforces this by only ever holding
    /// one `HealthMonitor` in its `health_monitor` slot.
    pub(crate) fn start(inner: Arc<SessionInner>) -> Self {
        let task = tokio::spawn(async move { Self::run(inner).await });
        Self { task }
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }

    async fn run(inner: Arc<SessionInner>) {
        let interval_ms = inner.healthcheck_interval_ms();
        let max_retries = inner.max_healthcheck_retries();
        let mut retries: u32 = 0;

        loop {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;

            if inner.closed.load(Ordering::SeqCst) {
                return;
            }

            let acquired = OwnershipArbiter::new(&inner.store).try_acquire(
                inner.pid,
                crate::session::now_ms(),
                inner.staleness_threshold_ms(),
            );

            match acquired {
                Ok(true) => {
                    retries = 0;
                    // Promotion either succeeds (the session is now owner,
                    // heartbeat takes over, and this loop has no further
                    // purpose) or fails and is rolled back (stay reader,
                    // keep polling).
                    if inner.clone().promote().await {
                        return;
                    }
                }
                Ok(false) => {
                    retries = 0;
                }
                Err(err) => {
                    tracing::error!(error = %err, "healthcheck failed to reach the ownership arbiter");
                    retries += 1;
                    if retries >= max_retries {
                        tracing::error!(
                            retries,
                            "giving up on ownership healthcheck after too many consecutive failures; closing session"
                        );
                        if let Err(err) = inner.close().await {
                            tracing::error!(error = %err, "close after healthcheck exhaustion failed");
                        }
                        return;
                    }
                }
            }
        }
    }
}
