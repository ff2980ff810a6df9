//! Periodic maintenance scaffolding shared by the storage backends.
//!
//! Each task is owned by its store instance (no ambient global timers),
//! runs one pass per interval tick, and stops on request. A stop signal
//! is only observed between passes, so an in-flight pass always finishes
//! before the task exits.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Handle to one running maintenance task. Dropping it (or the store
/// that owns it) signals the task to stop after its current pass.
pub(crate) struct MaintenanceTask {
    stop: watch::Sender<bool>,
}

impl MaintenanceTask {
    pub(crate) fn stop(self) {
        let _ = self.stop.send(true);
    }
}

/// Spawn a task running `pass` every `every`, starting immediately.
///
/// Requires a Tokio runtime; stores only call this from `start_*`
/// methods or eager-start construction, both documented as needing one.
pub(crate) fn spawn<F, Fut>(task: &'static str, every: Duration, mut pass: F) -> MaintenanceTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (stop, mut stopped) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => pass().await,
                _ = stopped.changed() => break,
            }
        }
        debug!(task, "maintenance task stopped");
    });
    MaintenanceTask { stop }
}
