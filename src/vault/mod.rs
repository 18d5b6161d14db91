//! Vault module — the encrypted secret store.
//!
//! This module provides:
//! - The on-disk header and key-directory schema (`format`)
//! - Item, payload, and listing types (`item`)
//! - The high-level `Vault` façade (`store`)

pub mod format;
pub mod item;
pub mod store;

// Re-export the most commonly used items.
pub use format::{Header, KdItem, KdfHeader, KeyDirectory, Policy};
pub use item::{Item, ItemMeta, MetaFilter};
pub use store::Vault;
