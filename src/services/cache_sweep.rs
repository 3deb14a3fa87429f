//! Cache sweep service
//!
//! Actively evicts expired entries from the in-process cache so keys that
//! are written and never read again do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::cache::MemoryStore;

/// Cache sweep service
pub struct CacheSweepService {
    store: Arc<MemoryStore>,
    sweep_interval: Duration,
    /// First sweep is one full interval after construction
    first_sweep_at: Instant,
}

impl CacheSweepService {
    pub fn new(store: Arc<MemoryStore>, sweep_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            store,
            sweep_interval,
            first_sweep_at: now.checked_add(sweep_interval).unwrap_or(now),
        }
    }

    /// Run the sweep loop until shutdown is signalled or the handle goes away
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting cache sweep with {}ms interval",
            self.sweep_interval.as_millis()
        );

        let mut ticker = interval_at(self.first_sweep_at, self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cache sweep shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn sweep(&self) {
        let removed = self.store.purge_expired();
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
    }
}

/// Handle owning the sweep task
///
/// Dropping the handle signals shutdown, so the task never outlives its cache.
pub struct CacheSweepHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CacheSweepHandle {
    /// Spawn `service` on the current tokio runtime
    pub fn spawn(service: CacheSweepService) -> Self {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            service.run(rx).await;
        });

        Self {
            shutdown_tx: tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the task to finish after `shutdown`
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for CacheSweepHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
