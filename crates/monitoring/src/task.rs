//! Timer-driven background tasks with an explicit stop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Handle to a background task that runs a closure on a fixed interval
pub struct PeriodicTask {
    name: &'static str,
    stop_signal: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period`. The first run happens one period after spawn.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop_signal = Arc::new(Notify::new());
        let stop = stop_signal.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(task = name, "Periodic task tick");
                        tick().await;
                    }
                    _ = stop.notified() => {
                        info!(task = name, "Periodic task stopping");
                        break;
                    }
                }
            }
        });

        Self {
            name,
            stop_signal,
            handle,
        }
    }

    /// Task name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it to exit
    pub async fn stop(self) {
        self.stop_signal.notify_one();
        let _ = self.handle.await;
    }
}
