use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::{RecordStore, ThrottleRecord};

/// Process-local record store.
///
/// `test` only reads; records change solely through `set` and `gc`. Two
/// overlapping throttle calls for the same identifier can both pass `test`
/// before either `set` lands, so both may be admitted. That race is accepted
/// for this store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ThrottleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    pub fn with_records(records: HashMap<String, ThrottleRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, id: &str) -> Option<ThrottleRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set(&self, id: &str, duration_secs: u64) -> ThrottlerResult<()> {
        let mut records = self.records.write().map_err(|_| {
            ThrottlerError::Storage("Failed to acquire write lock on records".to_string())
        })?;
        records.insert(id.to_string(), ThrottleRecord::new(duration_secs));
        Ok(())
    }

    async fn test(&self, id: &str) -> ThrottlerResult<bool> {
        let records = self.records.read().map_err(|_| {
            ThrottlerError::Storage("Failed to acquire read lock on records".to_string())
        })?;
        let now = Instant::now();
        Ok(records.get(id).map_or(true, |record| record.is_expired(now)))
    }

    async fn gc(&self) -> ThrottlerResult<()> {
        let mut records = self.records.write().map_err(|_| {
            ThrottlerError::Storage("Failed to acquire write lock on records".to_string())
        })?;
        let now = Instant::now();
        let initial_count = records.len();

        records.retain(|_, record| !record.is_expired(now));

        debug!(
            target: "keyed_throttle::memory",
            removed = initial_count - records.len(),
            remaining = records.len(),
            "Swept expired throttle records"
        );
        Ok(())
    }
}
