//! Cryptographic primitives for the vault core.
//!
//! This module provides:
//! - The envelope AEAD codec with backward-compatible decoding (`envelope`)
//! - Argon2id passphrase-based KEK derivation (`kdf`)
//! - The KEK/VRK/DEK key hierarchy and AAD contract (`keys`)

pub mod envelope;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use secretvault::crypto::{seal, open_any, derive_kek, ...};
pub use envelope::{open, open_any, open_xchacha, seal, seal_xchacha};
pub use kdf::{derive_kek, generate_salt, KdfParams};
pub use keys::{Dek, Kek, Vrk};
