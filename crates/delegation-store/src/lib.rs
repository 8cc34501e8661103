//! Storage for X.509 proxy delegation.
//!
//! A delegation session has two phases. First a proxy request (a certificate
//! signing request plus its private key) is parked under a delegation
//! identifier. Once the user signs it, the resulting proxy credential is
//! stored under the same identifier until it expires. This crate persists
//! both records, keeps at most one of each per identifier, and purges
//! credentials after they expire.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DelegationStore                          │
//! │  put/get/delete_request │ put/get/renew/delete_credential   │
//! │        (logical expiry, error mapping, tracing)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 Collection<B, Document>                     │
//! │     (typed documents, unique keys, TTL index → expiry)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  StorageBackend trait                       │
//! │  (get, insert-if-absent, compare_and_set, delete, range)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     MemoryBackend                           │
//! │          (expiring entries, background purge)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::{sync::Arc, time::Duration as StdDuration};
//!
//! use chrono::{Duration, Utc};
//! use delegation_store::{
//!     CredentialPayload, DelegationStore, DelegationStoreConfig, MemoryBackend, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config =
//!         DelegationStoreConfig::builder().purge_interval(StdDuration::from_secs(10)).build()?;
//!     // The engine purges on the configured interval; `initialize` rejects a mismatch.
//!     let backend = MemoryBackend::from_config(&config, Arc::new(SystemClock));
//!     let store = DelegationStore::initialize(backend, config).await?;
//!
//!     let payload = CredentialPayload::builder()
//!         .user_dn("/DC=org/CN=alice")
//!         .pem("-----BEGIN CERTIFICATE-----".to_owned())
//!         .build();
//!     store.put_credential("xyz".into(), payload, Utc::now() + Duration::hours(1)).await?;
//!
//!     let credential = store.get_credential("xyz").await?;
//!     assert_eq!(credential.payload.user_dn, "/DC=org/CN=alice");
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Store operations return [`DelegationResult<T>`]. A second insert for the
//! same identifier fails with [`DelegationError::DuplicateDelegation`]; a
//! missing or expired record reads as [`DelegationError::NotFound`]; engine
//! outages surface as [`DelegationError::StoreUnavailable`]. Nothing is
//! retried internally.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fixtures, a store factory driven by a
//!   [`ManualClock`], and assertion macros. Enable this in `[dev-dependencies]` for integration
//!   tests.
//! - **`failpoints`**: Compiles fail points into [`MemoryBackend`] so tests can simulate an
//!   unreachable engine.

#![deny(unsafe_code)]

pub mod backend;
pub mod clock;
pub mod collection;
pub mod config;
pub mod error;
pub mod memory;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::{KeyValue, StorageBackend};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use collection::{Collection, Document};
pub use config::DelegationStoreConfig;
pub use error::{
    BoxError, ConfigError, DelegationError, DelegationResult, StorageError, StorageResult,
};
pub use memory::MemoryBackend;
pub use store::{DelegationStore, RenewOutcome};
pub use types::{
    CredentialPayload, DelegationId, ProxyCredential, ProxyRequest, RequestPayload,
};
pub use zeroize::Zeroizing;
