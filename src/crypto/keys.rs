//! The layered key hierarchy and its associated-data contract.
//!
//! Three kinds of 32-byte secrets flow through the vault:
//!
//! - **KEK**: derived from the passphrase on every create/unlock/rotate;
//!   lives for the single call that uses it.
//! - **VRK**: the vault root key, generated once at create, persisted
//!   only wrapped under the KEK, held in memory while unlocked.
//! - **DEK**: one per item, generated at add, persisted only wrapped
//!   under the VRK.
//!
//! Each wrapper zeroes its bytes on drop and refuses to print them.
//! The AAD strings below bind every wrap to its purpose and item ID, so
//! a ciphertext moved to a different slot fails authentication instead
//! of decrypting under the wrong identity.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::envelope;
use crate::errors::Result;

/// Length of every key in the hierarchy (256 bits).
pub const KEY_LEN: usize = 32;

/// AAD for the VRK wrapped under the KEK.
pub const AAD_VRK_WRAP: &[u8] = b"vrk-wrap";

/// AAD for the KeyDirectory sealed under the VRK.
pub const AAD_KEY_DIRECTORY: &[u8] = b"kd";

/// AAD for a DEK wrapped under the VRK, bound to its item ID.
pub fn dek_wrap_aad(id: &str) -> Vec<u8> {
    format!("dek-wrap:{id}").into_bytes()
}

/// AAD for an item payload sealed under its DEK, bound to the item ID.
pub fn item_aad(id: &str) -> Vec<u8> {
    format!("item:{id}").into_bytes()
}

macro_rules! secret_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("key", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_key! {
    /// Key-encryption key, derived from the master passphrase.
    Kek
}

secret_key! {
    /// Vault root key.  Wraps the key directory and every DEK.
    Vrk
}

secret_key! {
    /// Per-item data-encryption key.
    Dek
}

impl Vrk {
    /// Generate a fresh random VRK.  Called once per vault lifetime.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Dek {
    /// Generate a fresh random DEK for a new item.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

// ---------------------------------------------------------------------------
// Wrapping
// ---------------------------------------------------------------------------

/// Seal the VRK under the KEK in the current envelope format.
pub fn wrap_vrk(kek: &Kek, vrk: &Vrk) -> Result<Vec<u8>> {
    envelope::seal(kek.as_bytes(), vrk.as_bytes(), AAD_VRK_WRAP)
}

/// Recover the VRK from its wrap.  Accepts legacy formats so vaults
/// created before the v2 envelope still unlock.
pub fn unwrap_vrk(kek: &Kek, wrap: &[u8]) -> Result<Vrk> {
    let mut plain = envelope::open_any(kek.as_bytes(), wrap, AAD_VRK_WRAP)?;
    let vrk = key_from_vec(&plain, "VRK")?;
    plain.zeroize();
    Ok(Vrk(vrk))
}

/// Wrap an item's DEK under the VRK, bound to the item ID.
pub fn wrap_dek(vrk: &Vrk, dek: &Dek, id: &str) -> Result<Vec<u8>> {
    envelope::seal_xchacha(vrk.as_bytes(), dek.as_bytes(), &dek_wrap_aad(id))
}

/// Recover an item's DEK.  The AAD binding means a wrap copied onto a
/// different item ID fails here with an authentication error.
pub fn unwrap_dek(vrk: &Vrk, wrap: &[u8], id: &str) -> Result<Dek> {
    let mut plain = envelope::open_xchacha(vrk.as_bytes(), wrap, &dek_wrap_aad(id))?;
    let dek = key_from_vec(&plain, "DEK")?;
    plain.zeroize();
    Ok(Dek(dek))
}

fn key_from_vec(plain: &[u8], what: &str) -> Result<[u8; KEY_LEN]> {
    if plain.len() != KEY_LEN {
        return Err(crate::errors::VaultError::InvalidState(format!(
            "{what} has wrong length: expected {KEY_LEN}, got {}",
            plain.len()
        )));
    }
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(plain);
    Ok(bytes)
}
