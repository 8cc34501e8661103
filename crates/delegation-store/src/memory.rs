//! In-memory storage engine.
//!
//! [`MemoryBackend`] implements [`StorageBackend`] over a [`BTreeMap`] guarded
//! by a [`parking_lot::RwLock`]. It is the engine used by tests and by
//! single-process deployments that do not need durability.
//!
//! # Features
//!
//! - **Atomic inserts**: the insert-if-absent check and the write happen under one write lock, so
//!   concurrent inserts on a key produce exactly one winner
//! - **Ordered storage**: range scans walk the map in key order
//! - **TTL support**: each entry may carry an absolute expiry; a background task purges expired
//!   entries on a fixed interval
//!
//! # Example
//!
//! ```
//! use delegation_store::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.insert(b"greeting".to_vec(), b"hello".to_vec(), None).await.unwrap();
//!     let value = backend.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Physical removal lags expiry by up to one purge interval

use std::{
    collections::BTreeMap,
    ops::{Bound, RangeBounds},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fail::fail_point;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};
use tracing::debug;

use crate::{
    backend::{KeyValue, StorageBackend},
    clock::{SharedClock, SystemClock},
    config::{DEFAULT_PURGE_INTERVAL, DelegationStoreConfig},
    error::{StorageError, StorageResult},
};

/// Fails the current operation with a connection error when the
/// `memory-unavailable` fail point is active.
macro_rules! fail_unavailable {
    () => {
        fail_point!("memory-unavailable", |_| {
            Err(StorageError::connection("injected failure: memory backend unavailable"))
        });
    };
}

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the purge task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| now < expiry)
    }
}

type EntryMap = BTreeMap<Vec<u8>, Entry>;

/// In-memory storage engine using a [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same data.
///
/// # Shutdown
///
/// The purge task holds only the data map, never a backend clone, so it
/// stops once every clone has been dropped. [`shutdown`](Self::shutdown)
/// stops it explicitly.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<EntryMap>>,
    clock: SharedClock,
    purge_interval: Duration,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryBackend {
    /// Creates an engine on the system clock with the default purge interval.
    ///
    /// Must be called from within a Tokio runtime; the purge task is spawned
    /// immediately.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_PURGE_INTERVAL)
    }

    /// Creates an engine using the purge interval from `config`.
    pub fn from_config(config: &DelegationStoreConfig, clock: SharedClock) -> Self {
        Self::with_clock(clock, config.purge_interval())
    }

    /// Creates an engine reading time from `clock` and purging every
    /// `purge_interval`.
    pub fn with_clock(clock: SharedClock, purge_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
            purge_interval,
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        let data = Arc::clone(&backend.data);
        let clock = Arc::clone(&backend.clock);
        tokio::spawn(async move {
            purge_loop(data, clock, purge_interval, shutdown_rx).await;
        });

        backend
    }

    /// Signals the purge task to stop.
    ///
    /// Data operations keep working; expired entries simply stop being
    /// removed until [`purge_expired`](StorageBackend::purge_expired) is
    /// called by hand.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Number of entries physically held, including expired ones not yet purged.
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.data.read().len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.stored_len())
            .field("clock", &self.clock)
            .field("purge_interval", &self.purge_interval)
            .finish_non_exhaustive()
    }
}

/// Removes expired entries, returning how many were dropped.
fn purge(data: &RwLock<EntryMap>, now: DateTime<Utc>) -> usize {
    // Scan under the read lock so foreground traffic is only blocked for the
    // removal itself.
    let expired: Vec<Vec<u8>> = {
        let guard = data.read();
        guard.iter().filter(|(_, entry)| !entry.is_live(now)).map(|(k, _)| k.clone()).collect()
    };

    if expired.is_empty() {
        return 0;
    }

    let mut guard = data.write();
    let mut removed = 0;
    for key in expired {
        // Re-check: the key may have been re-inserted since the scan.
        if guard.get(&key).is_some_and(|entry| !entry.is_live(now)) {
            guard.remove(&key);
            removed += 1;
        }
    }
    removed
}

async fn purge_loop(
    data: Arc<RwLock<EntryMap>>,
    clock: SharedClock,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(interval) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let removed = purge(&data, clock.now());
        if removed > 0 {
            debug!(removed, "purged expired entries");
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        fail_unavailable!();

        let now = self.clock.now();
        let data = self.data.read();
        Ok(data.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value.clone()))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        fail_unavailable!();

        let now = self.clock.now();
        let mut data = self.data.write();

        let current = data.get(key).filter(|entry| entry.is_live(now));
        let matches = match (expected, current) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur.value[..],
            _ => false,
        };

        if !matches {
            return Err(StorageError::Conflict);
        }

        data.insert(key.to_vec(), Entry { value: Bytes::from(new_value), expires_at });
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        fail_unavailable!();

        self.data.write().remove(key);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        fail_unavailable!();

        let start = match range.start_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let end = match range.end_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let now = self.clock.now();
        let data = self.data.read();
        let results = data
            .range::<[u8], _>((start, end))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(k, entry)| KeyValue::new(Bytes::copy_from_slice(k), entry.value.clone()))
            .collect();

        Ok(results)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn purge_expired(&self) -> StorageResult<usize> {
        fail_unavailable!();

        Ok(purge(&self.data, self.clock.now()))
    }

    fn purge_interval(&self) -> Option<Duration> {
        Some(self.purge_interval)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn health_check(&self) -> StorageResult<()> {
        fail_unavailable!();

        // Taking the read lock proves the map is not deadlocked.
        let _unused = self.data.read();
        Ok(())
    }
}
