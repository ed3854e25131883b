//! Background sweeping of expired throttle records.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::RecordStore;

/// Owns the sweep task for one store.
///
/// The task sleeps for the interval, sweeps, and only then starts the next
/// interval, so a slow sweep never overlaps the following one. A failed
/// sweep is logged and the cycle continues.
#[derive(Debug, Default)]
pub struct GcScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GcScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sweeping `store` every `interval`.
    ///
    /// Returns `true` if a task is running afterwards. A zero interval starts
    /// nothing; a second call while a task is alive leaves it untouched.
    pub fn enable(&self, store: Arc<dyn RecordStore>, interval: Duration) -> bool {
        if interval.is_zero() {
            debug!(target: "keyed_throttle::gc", "GC interval is zero, sweeping disabled");
            return self.is_running();
        }

        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    target: "keyed_throttle::gc",
                    "No tokio runtime available, expired records will not be swept"
                );
                return false;
            }
        };

        debug!(
            target: "keyed_throttle::gc",
            interval_secs = interval.as_secs(),
            "Starting throttle record sweep"
        );
        *handle = Some(runtime.spawn(sweep_loop(store, interval)));
        true
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Abort the sweep task. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
            debug!(target: "keyed_throttle::gc", "Stopped throttle record sweep");
        }
    }
}

impl Drop for GcScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(store: Arc<dyn RecordStore>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = store.gc().await {
            warn!(target: "keyed_throttle::gc", error = %e, "Throttle record sweep failed");
        }
    }
}
