//! Storage engine trait definition.
//!
//! [`StorageBackend`] is the contract the delegation store needs from a
//! storage engine: ordered byte keys, opaque byte values, an atomic
//! compare-and-set that doubles as insert-if-absent, and per-key absolute
//! expiry.
//!
//! Those primitives are enough to express the two index kinds the schema
//! declares:
//!
//! - **Unique index**: documents are keyed by their unique field, and inserts go through
//!   [`insert`](StorageBackend::insert), which fails with
//!   [`Conflict`](crate::StorageError::Conflict) when a live document occupies the key.
//! - **TTL index**: inserts carry `expires_at`; the engine treats the key as absent from that
//!   instant on and physically removes it during [`purge_expired`](StorageBackend::purge_expired).
//!
//! Document encoding and collection layout live in
//! [`Collection`](crate::collection::Collection), not in the engines.

use std::{ops::RangeBounds, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;

/// Key-value pair returned from range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Abstract storage engine for key-value operations.
///
/// Backends must be thread-safe and must make every method atomic with
/// respect to every other. A key whose expiry has passed is logically absent
/// for all reads and preconditions, whether or not it has been purged yet.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a live value by key |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Atomic conditional write |
/// | [`insert`](StorageBackend::insert) | Insert-if-absent |
/// | [`delete`](StorageBackend::delete) | Remove a key (idempotent) |
/// | [`get_range`](StorageBackend::get_range) | Ordered scan of live keys |
/// | [`purge_expired`](StorageBackend::purge_expired) | Physically remove expired keys |
/// | [`health_check`](StorageBackend::health_check) | Verify engine availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use delegation_store::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.insert(b"key".to_vec(), b"value".to_vec(), None).await.unwrap();
/// assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("value")));
///
/// // A second insert on the same key conflicts.
/// assert!(backend.insert(b"key".to_vec(), b"other".to_vec(), None).await.is_err());
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a live value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Atomically writes `new_value` if the current value matches `expected`.
    ///
    /// - **`expected: None`**: succeeds only when the key is absent or expired.
    /// - **`expected: Some(value)`**: succeeds only when the live value is byte-for-byte equal to
    ///   `value`.
    ///
    /// On success the key's expiry is replaced by `expires_at` (`None` means
    /// the key never expires).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) when
    /// the precondition does not hold.
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Inserts a value only if no live value exists at `key`.
    ///
    /// Equivalent to [`compare_and_set`](StorageBackend::compare_and_set)
    /// with `expected: None`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn insert(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        self.compare_and_set(&key, None, value, expires_at).await
    }

    /// Deletes a key.
    ///
    /// Deleting a missing key is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all live key-value pairs within a range, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Physically removes every key whose expiry has passed.
    ///
    /// Engines with native TTL support may run this on their own schedule;
    /// calling it explicitly is always safe. Returns the number of keys
    /// removed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn purge_expired(&self) -> StorageResult<usize>;

    /// How often the engine purges expired keys on its own, if it does.
    ///
    /// Used to check that the engine agrees with the store configuration.
    fn purge_interval(&self) -> Option<Duration> {
        None
    }

    /// Checks that the engine can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
