//! Error types for the storage engine and the delegation store.
//!
//! Two layers of errors exist:
//!
//! - [`StorageError`] is produced by [`StorageBackend`](crate::StorageBackend) implementations. It
//!   describes what went wrong inside the engine (a conflicting insert, a lost connection, a
//!   corrupt document).
//! - [`DelegationError`] is what callers of [`DelegationStore`](crate::DelegationStore) see. It
//!   speaks in terms of delegation identifiers: a duplicate delegation, a missing or expired
//!   record, an unavailable store.
//!
//! Engine errors are mapped into the caller-facing taxonomy at the store
//! boundary. Nothing is retried locally; a duplicate insert never succeeds on
//! retry and connectivity is the caller's concern.
//!
//! # Example
//!
//! ```
//! use delegation_store::{DelegationError, DelegationResult};
//!
//! fn lookup(id: &str) -> DelegationResult<()> {
//!     Err(DelegationError::not_found(id))
//! }
//!
//! assert!(matches!(lookup("abc"), Err(DelegationError::NotFound { .. })));
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage engine operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for delegation store operations.
pub type DelegationResult<T> = Result<T, DelegationError>;

/// Errors produced by a storage engine.
///
/// Backend implementations map their internal failures to these variants.
/// Source errors are preserved through `#[source]` so the full chain is
/// available to whoever logs the error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested key does not exist.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A compare-and-set precondition failed.
    ///
    /// For insert-if-absent this means a live document already occupies the
    /// key, which is how unique indexes are enforced.
    #[error("Write conflict")]
    Conflict,

    /// The engine could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Backend-specific failure that fits no other category.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded the engine's time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Returns `true` if the error means the engine could not serve the request.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_with_source(err.to_string(), err)
    }
}

/// Errors surfaced to callers of the delegation store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DelegationError {
    /// A record already exists for this delegation identifier.
    #[error("Delegation already exists: {delegation_id}")]
    DuplicateDelegation {
        /// The identifier that collided.
        delegation_id: String,
    },

    /// No live record exists for this delegation identifier.
    ///
    /// Logically expired credentials that have not been purged yet also
    /// produce this error.
    #[error("Delegation not found: {delegation_id}")]
    NotFound {
        /// The identifier that was looked up.
        delegation_id: String,
    },

    /// The underlying storage engine is unreachable.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure.
        message: String,
        /// The engine error behind this failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A collection already exists with a different definition.
    #[error("Schema mismatch for collection {collection}")]
    SchemaMismatch {
        /// The collection whose stored definition differs.
        collection: String,
    },

    /// The store configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Any other engine failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl DelegationError {
    /// Creates a new `DuplicateDelegation` error.
    #[must_use]
    pub fn duplicate(delegation_id: impl Into<String>) -> Self {
        Self::DuplicateDelegation { delegation_id: delegation_id.into() }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(delegation_id: impl Into<String>) -> Self {
        Self::NotFound { delegation_id: delegation_id.into() }
    }

    /// Creates a new `StoreUnavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { message: message.into(), source: None }
    }

    /// Maps an engine error raised while operating on `delegation_id`.
    ///
    /// `Conflict` becomes `DuplicateDelegation` and `NotFound` keeps the
    /// delegation identifier rather than the raw storage key.
    pub(crate) fn from_storage(delegation_id: &str, err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::duplicate(delegation_id),
            StorageError::NotFound { .. } => Self::not_found(delegation_id),
            other => Self::from(other),
        }
    }
}

impl From<StorageError> for DelegationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Connection { .. } | StorageError::Timeout => {
                Self::StoreUnavailable { message: err.to_string(), source: Some(Arc::new(err)) }
            },
            StorageError::Serialization { message, source } => {
                Self::Serialization { message, source }
            },
            other => Self::Internal { message: other.to_string(), source: Some(Arc::new(other)) },
        }
    }
}

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// The minimum accepted value.
        min: String,
        /// The value that was supplied.
        value: String,
    },

    /// A value is above its allowed maximum.
    #[error("{field} must be at most {max}, got {value}")]
    AboveMaximum {
        /// The offending field.
        field: &'static str,
        /// The maximum accepted value.
        max: String,
        /// The value that was supplied.
        value: String,
    },

    /// The storage engine was built with a different setting.
    #[error("{field} is {configured} in the store config but {actual} in the engine")]
    EngineMismatch {
        /// The offending field.
        field: &'static str,
        /// The value in the store configuration.
        configured: String,
        /// The value the engine runs with.
        actual: String,
    },
}
