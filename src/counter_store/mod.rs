//! Persistent counter store for the anonymous quota.
//!
//! Holds `{count, lastSyncAt}` under a single origin-scoped key. Clamping and
//! timestamping happen here so no caller can persist an out-of-range count.
//! Storage failures never reach callers: the store drops to an in-memory,
//! session-scoped fallback and keeps serving from there.

pub mod backend;
pub mod file_backend;

pub use backend::{MemoryBackend, StorageBackend};
pub use file_backend::FileBackend;

use crate::quota::types::QuotaState;
use crate::services::SharedClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Key holding the serialized counter.
pub const COUNTER_KEY: &str = "anonymous-quota";

/// On-disk shape of the counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCounter {
    count: u32,
    #[serde(default)]
    last_sync_at: Option<DateTime<Utc>>,
}

pub struct CounterStore {
    backend: Arc<dyn StorageBackend>,
    fallback: MemoryBackend,
    degraded: AtomicBool,
    /// Serializes read-modify-write sequences.
    op_lock: Mutex<()>,
    max_count: u32,
    clock: SharedClock,
}

impl CounterStore {
    pub fn new(backend: Arc<dyn StorageBackend>, max_count: u32, clock: SharedClock) -> Self {
        Self {
            backend,
            fallback: MemoryBackend::new(),
            degraded: AtomicBool::new(false),
            op_lock: Mutex::new(()),
            max_count,
            clock,
        }
    }

    /// A store that never touches persistent storage.
    pub fn in_memory(max_count: u32, clock: SharedClock) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), max_count, clock)
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// True once a storage failure forced the in-memory fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Reads the current state. Absent or unreadable state reads as `count = 0`.
    pub fn read(&self) -> QuotaState {
        let _guard = self.op_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_unlocked()
    }

    /// Overwrites the count (clamped) and stamps `last_sync_at = now`.
    pub fn write(&self, count: u32) -> QuotaState {
        let _guard = self.op_lock.lock().unwrap_or_else(|e| e.into_inner());
        let state = QuotaState {
            count: count.min(self.max_count),
            max_count: self.max_count,
            last_sync_at: Some(self.clock.now()),
        };
        self.persist(&state);
        state
    }

    /// Bumps the count by one, saturating at `max_count`.
    ///
    /// `last_sync_at` is left untouched: an optimistic bump is not a
    /// reconciliation.
    pub fn increment(&self) -> QuotaState {
        let _guard = self.op_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.read_unlocked();
        state.count = state.count.saturating_add(1).min(self.max_count);
        self.persist(&state);
        state
    }

    /// Removes the persisted counter entirely.
    pub fn clear(&self) {
        let _guard = self.op_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.is_degraded() {
            if let Err(e) = self.backend.remove(COUNTER_KEY) {
                self.degrade(&e);
            }
        }
        // The fallback may hold state from before a degrade; it goes too.
        let _ = self.fallback.remove(COUNTER_KEY);
    }

    fn active(&self) -> &dyn StorageBackend {
        if self.is_degraded() {
            &self.fallback
        } else {
            self.backend.as_ref()
        }
    }

    fn read_unlocked(&self) -> QuotaState {
        let raw = match self.active().load(COUNTER_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                self.degrade(&e);
                self.fallback.load(COUNTER_KEY).ok().flatten()
            }
        };

        let Some(raw) = raw else {
            return QuotaState::fresh(self.max_count);
        };

        match serde_json::from_str::<StoredCounter>(&raw) {
            Ok(stored) => QuotaState {
                count: stored.count.min(self.max_count),
                max_count: self.max_count,
                last_sync_at: stored.last_sync_at,
            },
            Err(e) => {
                tracing::warn!("Discarding unreadable quota counter: {}", e);
                QuotaState::fresh(self.max_count)
            }
        }
    }

    fn persist(&self, state: &QuotaState) {
        let stored = StoredCounter {
            count: state.count,
            last_sync_at: state.last_sync_at,
        };
        let content = match serde_json::to_string(&stored) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to serialize quota counter: {}", e);
                return;
            }
        };

        if let Err(e) = self.active().save(COUNTER_KEY, &content) {
            self.degrade(&e);
            let _ = self.fallback.save(COUNTER_KEY, &content);
        }
    }

    fn degrade(&self, error: &anyhow::Error) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "Counter storage unavailable, using session memory: {:#}",
                error
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/counter_store_tests.rs"]
mod tests;
