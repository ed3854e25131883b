//! Record storage for throttle decisions.
//!
//! A [`RecordStore`] keeps, per identifier, when an operation was last
//! admitted and the cooldown that applied to it. [`Storage`] pairs a store
//! with the sweep task that keeps its footprint bounded; several
//! [`Throttle`](crate::Throttle) instances may share one `Storage`.

use crate::error::ThrottlerResult;
use crate::gc::GcScheduler;
use crate::memory::MemoryStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The last admitted operation for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub last_admitted_at: Instant,
    /// Cooldown captured at admission time.
    pub duration_secs: u64,
}

impl ThrottleRecord {
    pub fn new(duration_secs: u64) -> Self {
        Self {
            last_admitted_at: Instant::now(),
            duration_secs,
        }
    }

    /// Whether the cooldown has elapsed as of `now`.
    ///
    /// Elapsed time is floored to whole seconds before comparing, and at
    /// least one millisecond must have passed, so a zero cooldown still
    /// rejects a repeat within the same tick.
    pub fn is_expired(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_admitted_at);
        elapsed.as_millis() > 0 && elapsed.as_secs() >= self.duration_secs
    }
}

/// Backend holding throttle records.
///
/// `test` followed by `set` is not atomic. Backends shared between threads or
/// processes that need exact admission must provide their own atomicity.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write or overwrite the record for `id`, stamped with the current time.
    async fn set(&self, id: &str, duration_secs: u64) -> ThrottlerResult<()>;

    /// `true` when `id` has no record or its cooldown has elapsed.
    async fn test(&self, id: &str) -> ThrottlerResult<bool>;

    /// Remove every record whose cooldown has elapsed.
    async fn gc(&self) -> ThrottlerResult<()>;
}

/// A record store together with its GC scheduler.
pub struct Storage {
    store: Arc<dyn RecordStore>,
    gc: GcScheduler,
}

impl Storage {
    pub fn new(store: Arc<dyn RecordStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            gc: GcScheduler::new(),
        })
    }

    /// Storage backed by a fresh [`MemoryStore`].
    pub fn memory() -> Arc<Self> {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Start sweeping every `interval`. A zero interval leaves GC disabled,
    /// and enabling an already running sweep is a no-op.
    pub fn enable_gc(&self, interval: Duration) -> bool {
        self.gc.enable(Arc::clone(&self.store), interval)
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc.is_running()
    }

    /// Cancel the sweep task.
    pub fn shutdown(&self) {
        self.gc.stop();
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("gc_enabled", &self.gc_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_record_expiry_is_floored() {
        let record = ThrottleRecord::new(2);
        let start = record.last_admitted_at;

        assert!(!record.is_expired(start));
        assert!(!record.is_expired(start + Duration::from_millis(1999)));
        assert!(record.is_expired(start + Duration::from_secs(2)));
        assert!(record.is_expired(start + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_record_expires_after_one_tick() {
        let record = ThrottleRecord::new(0);
        let start = record.last_admitted_at;

        assert!(!record.is_expired(start));
        assert!(!record.is_expired(start + Duration::from_micros(500)));
        assert!(record.is_expired(start + Duration::from_millis(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_storage_starts_without_gc() {
        let storage = Storage::memory();
        assert!(!storage.gc_enabled());
    }
}
