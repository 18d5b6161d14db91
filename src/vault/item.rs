//! Item types: the caller-facing shape, the sealed payload, and the
//! listing metadata.
//!
//! An `Item` is what callers hand in and get back: a short type tag
//! plus a string-to-string field map.  The payload actually sealed
//! under the DEK additionally carries timestamps and a version counter;
//! those fields stay on disk and surface only through `ItemMeta`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A decrypted item as seen by callers.  Never persisted in cleartext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Short ASCII type tag, lowercase canonical (e.g. "login", "note").
    #[serde(rename = "type")]
    pub item_type: String,

    /// Field map; keys unique, order irrelevant.
    pub fields: HashMap<String, String>,
}

/// The canonical payload sealed under the DEK.
///
/// `created`, `updated`, and `version` ride inside the ciphertext so
/// they survive sessions; `get` intentionally drops them when shaping
/// the returned `Item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPayload {
    #[serde(rename = "type")]
    pub item_type: String,
    pub fields: HashMap<String, String>,
    /// Unix seconds.
    pub created: i64,
    /// Unix seconds.
    pub updated: i64,
    /// Monotonically increasing per update, starting at 1.
    pub version: u32,
}

/// Public-shape record for listing.  Reveals the type tag and
/// timestamps by design; field contents stay sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub created: i64,
    pub updated: i64,
    pub version: u32,
}

/// Listing filter.  An empty filter matches everything; `item_type`
/// matches by equality.
#[derive(Debug, Clone, Default)]
pub struct MetaFilter {
    pub item_type: Option<String>,
}

impl MetaFilter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match items with exactly this type tag.
    pub fn by_type(item_type: impl Into<String>) -> Self {
        Self {
            item_type: Some(item_type.into()),
        }
    }

    /// Whether `meta` passes this filter.
    pub fn matches(&self, meta: &ItemMeta) -> bool {
        match &self.item_type {
            Some(t) => meta.item_type == *t,
            None => true,
        }
    }
}
