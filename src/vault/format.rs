//! On-disk vault document and key-directory schema.
//!
//! The vault file is a JSON document with this shape:
//!
//! ```text
//! {
//!   "version": 2,
//!   "kdf": { "algo": "argon2id", "m": ..., "t": ..., "p": ..., "salt": b64 },
//!   "vrk_wrap":  b64,   // envelope(KEK, VRK, aad="vrk-wrap")
//!   "kd_cipher": b64,   // envelope(VRK, KeyDirectory, aad="kd")
//!   "padding":   b64    // reserved, never populated
//! }
//! ```
//!
//! Field names are part of the compatibility contract and must not
//! change without a version bump.  Binary values are base64 strings on
//! the JSON surface.  The KeyDirectory exists in plaintext only while
//! the vault is unlocked; at rest it lives inside `kd_cipher`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Current vault file format version.
pub const CURRENT_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The root document stored at the vault path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Format version.
    pub version: u32,

    /// KDF algorithm, parameters, and salt used to derive the KEK.
    pub kdf: KdfHeader,

    /// The VRK sealed under the KEK.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub vrk_wrap: Vec<u8>,

    /// The serialized KeyDirectory sealed under the VRK.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub kd_cipher: Vec<u8>,

    /// Reserved for size obfuscation; never populated.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "base64_encode_opt",
        deserialize_with = "base64_decode_opt"
    )]
    pub padding: Option<Vec<u8>>,
}

/// KDF parameters as persisted in the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfHeader {
    /// Always "argon2id".
    pub algo: String,
    /// Memory cost in KiB.
    pub m: u32,
    /// Iterations.
    pub t: u32,
    /// Parallelism lanes.
    pub p: u32,
    /// KDF salt (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
}

// ---------------------------------------------------------------------------
// KeyDirectory
// ---------------------------------------------------------------------------

/// The encrypted catalog of per-item key wraps.
///
/// Plaintext only while unlocked; serialized and sealed into
/// `Header::kd_cipher` on every flush.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDirectory {
    /// Item ID -> wrapped DEK.
    pub items: HashMap<String, KdItem>,

    /// Reserved for future multi-device enrollment.
    #[serde(default)]
    pub devices: HashMap<String, DeviceRecord>,

    /// Tunable timeouts and rehash targets.
    #[serde(default)]
    pub policy: Policy,
}

impl KeyDirectory {
    /// An empty directory with default policy, as written by create.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One entry in the key directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdItem {
    /// The item's DEK sealed under the VRK.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub dek_wrap: Vec<u8>,

    /// Reserved for a per-item integrity check; never computed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "base64_encode_opt",
        deserialize_with = "base64_decode_opt"
    )]
    pub meta_mac: Option<Vec<u8>>,
}

/// A device enrolled for future multi-device support.  Reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    #[serde(
        rename = "pubX25519",
        serialize_with = "base64_encode",
        deserialize_with = "base64_decode"
    )]
    pub pub_x25519: Vec<u8>,
    #[serde(
        rename = "pubEd25519",
        serialize_with = "base64_encode",
        deserialize_with = "base64_decode"
    )]
    pub pub_ed25519: Vec<u8>,
}

/// Per-vault policy knobs, stored inside the key directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub lock_timeout_ms: i64,
    pub clipboard_timeout_ms: i64,
    pub rehash_target_m: u32,
    pub rehash_target_t: u32,
    pub rehash_target_p: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5 * 60 * 1000,
            clipboard_timeout_ms: 25 * 1000,
            rehash_target_m: 1024 * 1024,
            rehash_target_t: 3,
            rehash_target_p: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Header IO
// ---------------------------------------------------------------------------

/// Read and parse the header document at `path`.
///
/// A missing file maps to `VaultNotFound`; unparseable JSON maps to
/// `InvalidState` so callers can distinguish corruption from absence.
pub fn read_header(path: &Path) -> Result<Header> {
    if !path.exists() {
        return Err(VaultError::VaultNotFound(path.to_path_buf()));
    }

    let data = fs::read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| VaultError::InvalidState(format!("header JSON: {e}")))
}

/// Write the header document to `path` **atomically**.
///
/// The JSON is written to a temp file in the same directory and renamed
/// over the target, so readers never see a half-written header.  File
/// mode is 0600.
pub fn write_header(path: &Path, header: &Header) -> Result<()> {
    let data = serde_json::to_vec_pretty(header)
        .map_err(|e| VaultError::Serialization(format!("header: {e}")))?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded byte fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn base64_encode_opt<S>(
    data: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match data {
        Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn base64_decode_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<u8>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|s| BASE64.decode(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: CURRENT_VERSION,
            kdf: KdfHeader {
                algo: "argon2id".into(),
                m: 8192,
                t: 1,
                p: 1,
                salt: vec![7u8; 32],
            },
            vrk_wrap: vec![1, 2, 3],
            kd_cipher: vec![4, 5, 6],
            padding: None,
        }
    }

    #[test]
    fn header_json_field_names_are_stable() {
        let json = serde_json::to_value(sample_header()).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["kdf"]["algo"], "argon2id");
        assert!(json["kdf"]["salt"].is_string(), "salt must be base64 text");
        assert!(json["vrk_wrap"].is_string());
        assert!(json["kd_cipher"].is_string());
        assert!(
            json.get("padding").is_none(),
            "absent padding must be omitted"
        );
    }

    #[test]
    fn header_roundtrips_through_json() {
        let header = sample_header();
        let json = serde_json::to_vec(&header).unwrap();
        let back: Header = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.version, header.version);
        assert_eq!(back.kdf.salt, header.kdf.salt);
        assert_eq!(back.vrk_wrap, header.vrk_wrap);
        assert_eq!(back.kd_cipher, header.kd_cipher);
    }

    #[test]
    fn key_directory_defaults() {
        let kd = KeyDirectory::empty();
        assert!(kd.items.is_empty());
        assert!(kd.devices.is_empty());
        assert_eq!(kd.policy.lock_timeout_ms, 300_000);
        assert_eq!(kd.policy.rehash_target_m, 1_048_576);
    }

    #[test]
    fn kd_item_meta_mac_is_optional_on_the_wire() {
        let item = KdItem {
            dek_wrap: vec![9, 9],
            meta_mac: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("meta_mac").is_none());

        let parsed: KdItem = serde_json::from_str(r#"{"dek_wrap":"AAE="}"#).unwrap();
        assert!(parsed.meta_mac.is_none());
    }
}
