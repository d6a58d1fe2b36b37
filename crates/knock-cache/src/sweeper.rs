//! Background removal of expired entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Something the sweeper can purge on each tick.
pub(crate) trait Sweep: Send + Sync + 'static {
    /// Removes expired entries and returns how many were removed.
    fn sweep_expired(&self) -> usize;
}

/// Handle to a periodic sweep task.
///
/// The task only holds a weak reference to its target and exits as soon as the
/// target is gone or shutdown is signalled.
pub(crate) struct Sweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Starts sweeping `target` every `period`. The first sweep runs one
    /// period after start.
    ///
    /// `period` must be non-zero.
    pub(crate) fn spawn<T: Sweep>(target: Weak<T>, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::debug!(period_ms = period.as_millis() as u64, "Cache sweeper started");

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        let removed = target.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired cache entries");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            tracing::debug!("Cache sweeper stopped");
        });

        Self { shutdown, task }
    }

    /// Asks the task to stop without waiting for it.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stops the task and waits until it has exited.
    pub(crate) async fn stop(self) {
        self.signal();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::warn!(error = %e, "Cache sweeper panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
