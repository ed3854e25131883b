use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::hasher::KeySpec;
use crate::store::Storage;

pub const DEFAULT_DURATION_SECS: u64 = 5;
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 15;

/// Predicate that exempts a context from throttling.
pub type ExceptFn = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Settings a [`Throttle`](crate::Throttle) is built from.
#[derive(Clone)]
pub struct ThrottleOptions {
    /// Default cooldown in seconds.
    pub duration: u64,
    pub use_key: Option<KeySpec>,
    pub except: Option<ExceptFn>,
    /// Seconds between sweeps, zero disables sweeping.
    pub gc_interval: u64,
    pub storage: Arc<Storage>,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_SECS,
            use_key: None,
            except: None,
            gc_interval: DEFAULT_GC_INTERVAL_SECS,
            storage: Storage::memory(),
        }
    }
}

impl ThrottleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(mut self, secs: u64) -> Self {
        self.duration = secs;
        self
    }

    pub fn use_key(mut self, key: impl Into<KeySpec>) -> Self {
        self.use_key = Some(key.into());
        self
    }

    pub fn except<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.except = Some(Arc::new(predicate));
        self
    }

    pub fn gc_interval(mut self, secs: u64) -> Self {
        self.gc_interval = secs;
        self
    }

    /// Use `storage` instead of a private in-memory one. Pass the same handle
    /// to several option sets to share records between throttles.
    pub fn storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn gc_interval_duration(&self) -> Duration {
        Duration::from_secs(self.gc_interval)
    }
}

impl fmt::Debug for ThrottleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleOptions")
            .field("duration", &self.duration)
            .field("use_key", &self.use_key)
            .field("except", &self.except.is_some())
            .field("gc_interval", &self.gc_interval)
            .field("storage", &self.storage)
            .finish()
    }
}
