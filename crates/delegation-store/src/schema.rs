//! Collection and index definitions for delegated credentials.
//!
//! Two collections are declared:
//!
//! ```text
//! x509_proxies          unique(delegation_id)   ttl(not_after, expire_after = grace)
//! x509_proxy_requests   unique(delegation_id)
//! ```
//!
//! [`initialize_schema`] persists each [`CollectionSpec`] as a descriptor
//! document under `_schema/{name}`. It is idempotent: running it again with
//! the same definitions is a no-op, while a differing definition is reported
//! as [`DelegationError::SchemaMismatch`] instead of being overwritten.
//!
//! `x509_proxy_requests` carries no TTL index, so abandoned requests stay
//! until they are deleted explicitly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    backend::StorageBackend,
    error::{DelegationError, DelegationResult, StorageError},
};

/// Collection holding issued proxy credentials.
pub const X509_PROXIES: &str = "x509_proxies";

/// Collection holding pending proxy requests.
pub const X509_PROXY_REQUESTS: &str = "x509_proxy_requests";

/// Field carrying the delegation identifier in both collections.
pub const DELEGATION_ID_FIELD: &str = "delegation_id";

/// Field carrying the end of validity of a credential.
pub const NOT_AFTER_FIELD: &str = "not_after";

/// Key prefix under which collection descriptors are stored.
pub const SCHEMA_PREFIX: &str = "_schema/";

/// A single index on a collection field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexSpec {
    /// Indexed field name.
    pub field: String,

    /// Whether at most one document may hold a given value.
    pub unique: bool,

    /// For TTL indexes: how long after the indexed timestamp a document is
    /// removed.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<Duration>,
}

impl IndexSpec {
    /// A unique index on `field`.
    pub fn unique(field: impl Into<String>) -> Self {
        Self { field: field.into(), unique: true, expire_after: None }
    }

    /// A TTL index on the timestamp `field`.
    pub fn ttl(field: impl Into<String>, expire_after: Duration) -> Self {
        Self { field: field.into(), unique: false, expire_after: Some(expire_after) }
    }
}

/// Definition of a collection and its indexes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,

    /// Indexes declared on the collection.
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSpec {
    /// Starts a collection definition with no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), indexes: Vec::new() }
    }

    /// Adds an index.
    #[must_use]
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// The field covered by the unique index, if any.
    #[must_use]
    pub fn unique_field(&self) -> Option<&str> {
        self.indexes.iter().find(|idx| idx.unique).map(|idx| idx.field.as_str())
    }

    /// The TTL index, if any.
    #[must_use]
    pub fn ttl_index(&self) -> Option<&IndexSpec> {
        self.indexes.iter().find(|idx| idx.expire_after.is_some())
    }

    fn descriptor_key(&self) -> Vec<u8> {
        format!("{SCHEMA_PREFIX}{}", self.name).into_bytes()
    }
}

/// Definition of `x509_proxies` with the given TTL grace period.
#[must_use]
pub fn proxies_collection(grace: Duration) -> CollectionSpec {
    CollectionSpec::new(X509_PROXIES)
        .with_index(IndexSpec::unique(DELEGATION_ID_FIELD))
        .with_index(IndexSpec::ttl(NOT_AFTER_FIELD, grace))
}

/// Definition of `x509_proxy_requests`.
#[must_use]
pub fn proxy_requests_collection() -> CollectionSpec {
    CollectionSpec::new(X509_PROXY_REQUESTS).with_index(IndexSpec::unique(DELEGATION_ID_FIELD))
}

/// Both delegation collections.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use delegation_store::schema::{delegation_schema, X509_PROXIES};
///
/// let schema = delegation_schema(Duration::from_secs(600));
/// let proxies = schema.iter().find(|c| c.name == X509_PROXIES).unwrap();
/// assert_eq!(proxies.ttl_index().unwrap().expire_after, Some(Duration::from_secs(600)));
/// ```
#[must_use]
pub fn delegation_schema(grace: Duration) -> Vec<CollectionSpec> {
    vec![proxies_collection(grace), proxy_requests_collection()]
}

/// Creates the given collections if they do not exist yet.
///
/// Safe to call from every process at startup.
///
/// # Errors
///
/// - [`DelegationError::SchemaMismatch`] if a collection already exists with a different
///   definition.
/// - [`DelegationError::StoreUnavailable`] if the engine cannot be reached.
#[tracing::instrument(skip_all, fields(collections = specs.len()))]
pub async fn initialize_schema<B>(backend: &B, specs: &[CollectionSpec]) -> DelegationResult<()>
where
    B: StorageBackend,
{
    for spec in specs {
        ensure_collection(backend, spec).await?;
    }
    Ok(())
}

async fn ensure_collection<B>(backend: &B, spec: &CollectionSpec) -> DelegationResult<()>
where
    B: StorageBackend,
{
    let key = spec.descriptor_key();
    let encoded = serde_json::to_vec(spec).map_err(StorageError::from)?;

    loop {
        match backend.insert(key.clone(), encoded.clone(), None).await {
            Ok(()) => {
                debug!(collection = %spec.name, "created collection");
                return Ok(());
            },
            Err(StorageError::Conflict) => {},
            Err(e) => return Err(e.into()),
        }

        // Someone else created it; verify it matches. A descriptor deleted
        // between the insert and this read sends us round again.
        let Some(existing) = backend.get(&key).await? else {
            continue;
        };
        let existing: CollectionSpec =
            serde_json::from_slice(&existing).map_err(StorageError::from)?;

        if existing == *spec {
            debug!(collection = %spec.name, "collection already initialized");
            return Ok(());
        }

        warn!(collection = %spec.name, ?existing, wanted = ?spec, "collection definition differs");
        return Err(DelegationError::SchemaMismatch { collection: spec.name.clone() });
    }
}
