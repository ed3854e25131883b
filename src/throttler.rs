use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::Context;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::hasher::{identify, KeySpec};
use crate::options::{ExceptFn, ThrottleOptions};
use crate::store::Storage;

/// Cooldown throttle over a shared record storage.
///
/// Each call is one independent test-then-set transaction on a single
/// identifier. Cloning is cheap and clones share the same storage.
#[derive(Clone)]
pub struct Throttle {
    duration: u64,
    use_key: Option<KeySpec>,
    except: Option<ExceptFn>,
    storage: Arc<Storage>,
}

impl Throttle {
    /// Create a throttle and start sweeping its storage, unless the GC
    /// interval is zero or the storage is already being swept.
    pub fn new(options: ThrottleOptions) -> Self {
        options
            .storage
            .enable_gc(options.gc_interval_duration());

        Self {
            duration: options.duration,
            use_key: options.use_key,
            except: options.except,
            storage: options.storage,
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn default_duration(&self) -> u64 {
        self.duration
    }

    /// Identifier `context` is tracked under.
    pub fn identify(&self, context: &Context) -> String {
        identify(context, self.use_key.as_ref())
    }

    /// Decide with the configured default duration.
    pub async fn throttle(&self, context: &Context) -> ThrottlerResult<bool> {
        self.decide(context, self.duration).await
    }

    /// Decide with `duration` seconds; an admission records that duration.
    pub async fn throttle_for(&self, context: &Context, duration: u64) -> ThrottlerResult<bool> {
        self.decide(context, duration).await
    }

    /// Callback form of [`throttle`](Self::throttle). The callback receives
    /// the error, if any, and whether the operation may proceed.
    pub fn throttle_callback<F>(&self, context: Context, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<ThrottlerError>, bool) + Send + 'static,
    {
        self.throttle_for_callback(context, self.duration, callback)
    }

    /// Callback form of [`throttle_for`](Self::throttle_for).
    pub fn throttle_for_callback<F>(
        &self,
        context: Context,
        duration: u64,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<ThrottlerError>, bool) + Send + 'static,
    {
        let throttle = self.clone();
        tokio::spawn(async move {
            match throttle.decide(&context, duration).await {
                Ok(pass) => callback(None, pass),
                Err(e) => callback(Some(e), false),
            }
        })
    }

    async fn decide(&self, context: &Context, duration: u64) -> ThrottlerResult<bool> {
        let id = self.identify(context);

        if self.except.as_ref().is_some_and(|except| except(context)) {
            debug!(target: "keyed_throttle::throttle", id = %id, "Throttle bypassed");
            return Ok(true);
        }

        let store = self.storage.store();
        if !store.test(&id).await? {
            debug!(target: "keyed_throttle::throttle", id = %id, "Throttle denied");
            return Ok(false);
        }

        store.set(&id, duration).await?;
        debug!(
            target: "keyed_throttle::throttle",
            id = %id,
            duration_secs = duration,
            "Throttle admitted"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("duration", &self.duration)
            .field("use_key", &self.use_key)
            .field("except", &self.except.is_some())
            .field("storage", &self.storage)
            .finish()
    }
}
