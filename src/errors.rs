use std::path::PathBuf;
use thiserror::Error;

/// All errors the vault core can surface.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Authentication & state ---
    #[error("authentication failed — wrong passphrase or tampered data")]
    AuthFailure,

    #[error("vault is not unlocked")]
    NotUnlocked,

    // --- Crypto errors ---
    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Vault file errors ---
    #[error("vault already exists at {0}")]
    VaultExists(PathBuf),

    #[error("vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("invalid vault state: {0}")]
    InvalidState(String),

    // --- Item & store errors ---
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Storage(String),

    // --- IO & serialization ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    // --- Config errors ---
    #[error("config file error: {0}")]
    ConfigError(String),

    // --- Unrecoverable ---
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Convenience type alias for vault results.
pub type Result<T> = std::result::Result<T, VaultError>;
