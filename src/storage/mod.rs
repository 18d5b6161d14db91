//! Narrow storage contracts the vault core depends on.
//!
//! Blobs are opaque ciphertext; a store must never inspect them.  The
//! meta store is an optional convenience index for cross-session
//! listing; it leaks type tags, timestamps, and version numbers, which
//! callers opt into by configuring one.

pub mod file_store;
pub mod memory;

use crate::errors::Result;
use crate::vault::item::{ItemMeta, MetaFilter};

pub use file_store::FileBlobStore;
pub use memory::{MemoryBlobStore, MemoryMetaStore};

/// Ciphertext blob storage keyed by item ID.
pub trait BlobStore {
    /// Upsert the blob at `id`.
    fn put(&self, id: &str, data: &[u8]) -> Result<()>;

    /// Fetch the blob at `id`, or `NotFound`.
    fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Delete the blob at `id`.  A missing blob is not an error.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Searchable index of item metadata, upserted by logical `id`.
pub trait MetaStore {
    /// Insert or replace the meta record for `meta.id`.
    fn put_meta(&self, meta: &ItemMeta) -> Result<()>;

    /// All records matching `filter` (equality on type; empty filter
    /// returns everything).
    fn list_meta(&self, filter: &MetaFilter) -> Result<Vec<ItemMeta>>;
}
