//! Optional project-level configuration, loaded from `.vault.toml`.
//!
//! Every field has a default so the crate works with no config file at
//! all.  The settings feed the convenience constructor: blob directory
//! naming and the Argon2id profile used for create and rotate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{generate_salt, KdfParams};
use crate::errors::{Result, VaultError};

/// Tunables for a vault instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Suffix appended to the vault file name for the blob directory
    /// (default: ".blobs").
    #[serde(default = "default_blob_dir_suffix")]
    pub blob_dir_suffix: String,

    /// KDF profile: "desktop" (1 GiB) or "mobile" (128 MiB).
    #[serde(default = "default_kdf_profile")]
    pub kdf_profile: String,

    /// Explicit Argon2 memory cost in KiB; overrides the profile.
    #[serde(default)]
    pub argon2_memory_kib: Option<u32>,

    /// Explicit Argon2 iteration count; overrides the profile.
    #[serde(default)]
    pub argon2_iterations: Option<u32>,

    /// Explicit Argon2 parallelism; overrides the profile.
    #[serde(default)]
    pub argon2_parallelism: Option<u32>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_blob_dir_suffix() -> String {
    ".blobs".to_string()
}

fn default_kdf_profile() -> String {
    "desktop".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blob_dir_suffix: default_blob_dir_suffix(),
            kdf_profile: default_kdf_profile(),
            argon2_memory_kib: None,
            argon2_iterations: None,
            argon2_parallelism: None,
        }
    }
}

impl Settings {
    /// Name of the config file looked up next to the vault.
    const FILE_NAME: &'static str = ".vault.toml";

    /// Load settings from `<dir>/.vault.toml`.
    ///
    /// A missing file yields defaults; an unparseable file is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&config_path)
            .map_err(|e| VaultError::ConfigError(format!("cannot read config: {e}")))?;
        toml::from_str(&text)
            .map_err(|e| VaultError::ConfigError(format!("cannot parse config: {e}")))
    }

    /// Resolve these settings into concrete KDF parameters with a fresh
    /// salt.
    pub fn kdf_params(&self) -> Result<KdfParams> {
        let mut params = match self.kdf_profile.as_str() {
            "desktop" => KdfParams::desktop(),
            "mobile" => KdfParams::mobile(),
            other => {
                return Err(VaultError::ConfigError(format!(
                    "unknown kdf profile '{other}' (expected \"desktop\" or \"mobile\")"
                )))
            }
        };

        if let Some(m) = self.argon2_memory_kib {
            params.m = m;
        }
        if let Some(t) = self.argon2_iterations {
            params.t = t;
        }
        if let Some(p) = self.argon2_parallelism {
            params.p = p;
        }
        params.salt = generate_salt().to_vec();
        Ok(params)
    }
}
