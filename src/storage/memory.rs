//! In-memory stores.
//!
//! Useful in tests and as the stand-in for a remote document store: the
//! same upsert-by-id semantics, none of the transport.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{Result, VaultError};
use crate::storage::{BlobStore, MetaStore};
use crate::vault::item::{ItemMeta, MetaFilter};

/// Blob store holding ciphertext in a map.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, id: &str, data: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.lock().map_err(poisoned)?;
        blobs.insert(id.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.lock().map_err(poisoned)?;
        blobs
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().map_err(poisoned)?;
        blobs.remove(id);
        Ok(())
    }
}

/// Meta index holding records in a map keyed by logical `id`.
#[derive(Default)]
pub struct MemoryMetaStore {
    metas: Mutex<HashMap<String, ItemMeta>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the record for `id`, if present.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut metas = self.metas.lock().map_err(poisoned)?;
        metas.remove(id);
        Ok(())
    }
}

impl MetaStore for MemoryMetaStore {
    fn put_meta(&self, meta: &ItemMeta) -> Result<()> {
        let mut metas = self.metas.lock().map_err(poisoned)?;
        metas.insert(meta.id.clone(), meta.clone());
        Ok(())
    }

    fn list_meta(&self, filter: &MetaFilter) -> Result<Vec<ItemMeta>> {
        let metas = self.metas.lock().map_err(poisoned)?;
        Ok(metas.values().filter(|m| filter.matches(m)).cloned().collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> VaultError {
    VaultError::Storage("store lock poisoned".into())
}
