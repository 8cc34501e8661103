//! Typed collections over a [`StorageBackend`].
//!
//! A [`Collection`] stores documents of one type under the key
//! `{collection}/{unique key}`. Keying documents by their unique field makes
//! the backend's insert-if-absent the enforcement point of the unique index.
//! If the collection's [`CollectionSpec`] declares a TTL index, each document
//! is written with an absolute expiry of `indexed timestamp + expire_after`,
//! and the engine takes care of the rest.

use std::marker::PhantomData;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    schema::CollectionSpec,
};

/// A document that lives in a named collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Name of the collection holding documents of this type.
    const COLLECTION: &'static str;

    /// Value of the collection's unique field for this document.
    fn key(&self) -> &str;

    /// Value of a timestamp field, used to evaluate TTL indexes.
    ///
    /// Returns `None` if the document has no such field.
    fn indexed_timestamp(&self, field: &str) -> Option<DateTime<Utc>>;
}

/// A decoded document together with the exact bytes it was read from.
///
/// The raw bytes are the compare-and-set precondition for
/// [`Collection::replace`].
#[derive(Debug, Clone)]
pub struct Versioned<D> {
    /// The decoded document.
    pub document: D,
    raw: Bytes,
}

/// Typed handle on one collection.
#[derive(Debug, Clone)]
pub struct Collection<B, D> {
    backend: B,
    spec: CollectionSpec,
    _document: PhantomData<fn() -> D>,
}

impl<B, D> Collection<B, D>
where
    B: StorageBackend,
    D: Document,
{
    /// Binds a collection definition to `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the definition does not describe
    /// `D::COLLECTION` or declares no unique index.
    pub fn new(backend: B, spec: CollectionSpec) -> StorageResult<Self> {
        if spec.name != D::COLLECTION {
            return Err(StorageError::internal(format!(
                "collection definition {} does not match document collection {}",
                spec.name,
                D::COLLECTION
            )));
        }
        if spec.unique_field().is_none() {
            return Err(StorageError::internal(format!(
                "collection {} has no unique index",
                spec.name
            )));
        }
        Ok(Self { backend, spec, _document: PhantomData })
    }

    /// The collection definition.
    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    /// The underlying engine.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn storage_key(key: &str) -> Vec<u8> {
        format!("{}/{key}", D::COLLECTION).into_bytes()
    }

    /// Physical expiry of `document` under the collection's TTL index.
    ///
    /// Saturates at the latest representable instant rather than dropping
    /// the expiry.
    pub fn expiry_of(&self, document: &D) -> Option<DateTime<Utc>> {
        let index = self.spec.ttl_index()?;
        let timestamp = document.indexed_timestamp(&index.field)?;
        let expire_after = index.expire_after?;
        let expiry = chrono::Duration::from_std(expire_after)
            .ok()
            .and_then(|after| timestamp.checked_add_signed(after))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(expiry)
    }

    fn encode(document: &D) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(document)?)
    }

    fn decode(raw: &[u8]) -> StorageResult<D> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Inserts a document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a live document already holds
    /// the same unique key.
    pub async fn insert(&self, document: &D) -> StorageResult<()> {
        let value = Self::encode(document)?;
        let expires_at = self.expiry_of(document);
        self.backend.insert(Self::storage_key(document.key()), value, expires_at).await
    }

    /// Looks up a document by unique key.
    pub async fn find(&self, key: &str) -> StorageResult<Option<D>> {
        Ok(self.find_versioned(key).await?.map(|versioned| versioned.document))
    }

    /// Looks up a document and keeps its stored bytes for a later
    /// [`replace`](Self::replace).
    pub async fn find_versioned(&self, key: &str) -> StorageResult<Option<Versioned<D>>> {
        let Some(raw) = self.backend.get(&Self::storage_key(key)).await? else {
            return Ok(None);
        };
        let document = Self::decode(&raw)?;
        Ok(Some(Versioned { document, raw }))
    }

    /// Replaces `current` with `document`, provided nobody changed it since
    /// it was read.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the stored document is no longer
    /// `current`, and [`StorageError::Internal`] if the two documents have
    /// different keys.
    pub async fn replace(&self, current: &Versioned<D>, document: &D) -> StorageResult<()> {
        if current.document.key() != document.key() {
            return Err(StorageError::internal("replacement must keep the unique key"));
        }
        let value = Self::encode(document)?;
        let expires_at = self.expiry_of(document);
        self.backend
            .compare_and_set(
                &Self::storage_key(document.key()),
                Some(current.raw.as_ref()),
                value,
                expires_at,
            )
            .await
    }

    /// Deletes a document. Deleting a missing document succeeds.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.backend.delete(&Self::storage_key(key)).await
    }

    /// All live documents, ordered by key.
    pub async fn scan(&self) -> StorageResult<Vec<D>> {
        let start = format!("{}/", D::COLLECTION).into_bytes();
        // '0' is the byte after '/', so this bounds exactly the collection prefix.
        let end = format!("{}0", D::COLLECTION).into_bytes();

        let entries = self.backend.get_range(start..end).await?;
        entries.iter().map(|kv| Self::decode(&kv.value)).collect()
    }
}
