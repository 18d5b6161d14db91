//! Passphrase-based key derivation using Argon2id.
//!
//! The key-encryption key (KEK) is derived from the master passphrase
//! each time the vault is created, unlocked, or rotated.  Argon2id is
//! memory-hard, which makes offline attacks on a stolen vault file
//! expensive.  The parameters and salt live in the vault header so the
//! exact same derivation runs on every unlock.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::errors::{Result, VaultError};

/// Length of the KDF salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived KEK in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Argon2id parameters plus the salt they are bound to.
///
/// Stored in the vault header verbatim; `m` is in KiB.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m: u32,
    /// Number of iterations.
    pub t: u32,
    /// Parallelism lanes.
    pub p: u32,
    /// Random salt, persisted alongside the parameters.
    pub salt: Vec<u8>,
}

impl KdfParams {
    /// Desktop profile: 1 GiB memory, 3 iterations, 4 lanes, fresh salt.
    pub fn desktop() -> Self {
        Self {
            m: 1024 * 1024,
            t: 3,
            p: 4,
            salt: generate_salt().to_vec(),
        }
    }

    /// Mobile profile: 128 MiB memory, 3 iterations, 4 lanes, fresh salt.
    pub fn mobile() -> Self {
        Self {
            m: 128 * 1024,
            t: 3,
            p: 4,
            salt: generate_salt().to_vec(),
        }
    }

    /// Same parameters, new random salt.  Used by master rotation so the
    /// fresh KEK never shares a salt with the old one.
    pub fn with_fresh_salt(&self) -> Self {
        Self {
            m: self.m,
            t: self.t,
            p: self.p,
            salt: generate_salt().to_vec(),
        }
    }
}

/// Derive a 32-byte KEK from the master passphrase with explicit
/// Argon2id parameters.
///
/// The same passphrase + salt + params always produce the same key.
/// Enforces minimum parameters to prevent dangerously weak settings.
pub fn derive_kek(master: &[u8], params: &KdfParams) -> Result<[u8; KEY_LEN]> {
    if params.m < MIN_MEMORY_KIB {
        return Err(VaultError::KeyDerivationFailed(format!(
            "Argon2 memory cost must be at least {MIN_MEMORY_KIB} KiB (got {})",
            params.m
        )));
    }
    if params.t < 1 {
        return Err(VaultError::KeyDerivationFailed(
            "Argon2 iterations must be at least 1".into(),
        ));
    }
    if params.p < 1 {
        return Err(VaultError::KeyDerivationFailed(
            "Argon2 parallelism must be at least 1".into(),
        ));
    }
    if params.salt.len() < 16 {
        return Err(VaultError::KeyDerivationFailed(format!(
            "KDF salt must be at least 16 bytes (got {})",
            params.salt.len()
        )));
    }

    let argon_params = Params::new(params.m, params.t, params.p, Some(KEY_LEN))
        .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(master, &params.salt, &mut key)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
