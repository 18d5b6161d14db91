//! Envelope authenticated encryption with backward-compatible decoding.
//!
//! Three ciphertext formats coexist on disk:
//!
//! ```text
//! v2 (current writes):  [ salt 32 | nonce 12 | AES-256-GCM ct + 16-byte tag ]
//! v1 (decode only):     [ salt 32 | iv 16    | AES-256-CTR ct | HMAC-SHA256 32 ]
//! XChaCha20-Poly1305:   [ nonce 24 | ct + 16-byte tag ]
//! ```
//!
//! The v2 and v1 envelopes derive a fresh content key per message with
//! HKDF-SHA256 over the caller's key and the embedded salt, so the
//! long-lived key never touches the cipher directly.  The XChaCha format
//! uses the key as-is; it is reserved for item payloads and DEK wraps,
//! which are already keyed by fresh random keys.
//!
//! `open` accepts only v2.  `open_any` tries each format in order
//! (v2, then v1, then XChaCha) and is used where legacy data can exist:
//! the VRK wrap and the key-directory ciphertext.  There is no format
//! byte to sniff; length checks plus tag verification decide.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Size of the per-message HKDF salt in bytes.
pub const SALT_LEN: usize = 32;

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM / Poly1305 authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of the legacy AES-CTR IV in bytes.
const LEGACY_IV_LEN: usize = 16;

/// Size of the legacy HMAC-SHA256 tag in bytes.
const LEGACY_MAC_LEN: usize = 32;

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const XNONCE_LEN: usize = 24;

/// Smallest possible v2 envelope: salt + nonce + bare tag.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Smallest possible v1 envelope: salt + IV + bare MAC.
const MIN_LEGACY_LEN: usize = SALT_LEN + LEGACY_IV_LEN + LEGACY_MAC_LEN;

/// Smallest possible XChaCha ciphertext: nonce + bare tag.
const MIN_XCHACHA_LEN: usize = XNONCE_LEN + TAG_LEN;

/// HKDF info string for the current envelope format.
const HKDF_INFO_V2: &[u8] = b"vault/envelope/v2";

/// HKDF info string for the legacy CTR+HMAC format.
const HKDF_INFO_V1: &[u8] = b"vault/envelope/v1";

/// The ciphertext formats `open_any` knows how to decode, in cascade
/// order.  Each variant owns its own length floor and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeFormat {
    V2Gcm,
    V1CtrHmac,
    XChaChaPoly,
}

impl EnvelopeFormat {
    const CASCADE: [EnvelopeFormat; 3] = [
        EnvelopeFormat::V2Gcm,
        EnvelopeFormat::V1CtrHmac,
        EnvelopeFormat::XChaChaPoly,
    ];

    fn min_len(self) -> usize {
        match self {
            EnvelopeFormat::V2Gcm => MIN_ENVELOPE_LEN,
            EnvelopeFormat::V1CtrHmac => MIN_LEGACY_LEN,
            EnvelopeFormat::XChaChaPoly => MIN_XCHACHA_LEN,
        }
    }

    fn open(self, key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        match self {
            EnvelopeFormat::V2Gcm => open_v2(key, ciphertext, aad),
            EnvelopeFormat::V1CtrHmac => open_v1(key, ciphertext, aad),
            EnvelopeFormat::XChaChaPoly => open_xchacha(key, ciphertext, aad),
        }
    }
}

// ---------------------------------------------------------------------------
// Current format (v2): salt || nonce || AES-256-GCM
// ---------------------------------------------------------------------------

/// Seal `plaintext` under `key` in the current envelope format.
///
/// A fresh random salt and nonce are drawn for every call; the content
/// key is derived per message and zeroized before returning.
pub fn seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(VaultError::EncryptionFailed("empty key".into()));
    }

    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let content_key = derive_content_key(key, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(content_key.as_ref())
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid content key: {e}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let body = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| VaultError::EncryptionFailed(format!("GCM seal failed: {e}")))?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + body.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Open a v2 envelope.  Rejects every other format.
pub fn open(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    open_v2(key, ciphertext, aad)
}

fn open_v2(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < MIN_ENVELOPE_LEN {
        return Err(VaultError::CiphertextTooShort);
    }
    if key.is_empty() {
        return Err(VaultError::EncryptionFailed("empty key".into()));
    }

    let salt = &ciphertext[..SALT_LEN];
    let nonce = &ciphertext[SALT_LEN..SALT_LEN + NONCE_LEN];
    let body = &ciphertext[SALT_LEN + NONCE_LEN..];

    let content_key = derive_content_key(key, salt)?;
    let cipher = Aes256Gcm::new_from_slice(content_key.as_ref())
        .map_err(|_| VaultError::AuthFailure)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: body, aad })
        .map_err(|_| VaultError::AuthFailure)
}

/// HKDF-SHA256(key, salt, "vault/envelope/v2") -> 32-byte content key.
fn derive_content_key(key: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), key);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO_V2, okm.as_mut())
        .map_err(|e| VaultError::Fatal(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Legacy format (v1): salt || iv || ct || hmac  (decode only)
// ---------------------------------------------------------------------------

fn open_v1(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < MIN_LEGACY_LEN {
        return Err(VaultError::CiphertextTooShort);
    }
    if key.is_empty() {
        return Err(VaultError::EncryptionFailed("empty key".into()));
    }

    let salt = &ciphertext[..SALT_LEN];
    let iv = &ciphertext[SALT_LEN..SALT_LEN + LEGACY_IV_LEN];
    let mac_start = ciphertext.len() - LEGACY_MAC_LEN;
    let body = &ciphertext[SALT_LEN + LEGACY_IV_LEN..mac_start];
    let mac_tag = &ciphertext[mac_start..];

    let (enc_key, mac_key) = derive_legacy_keys(key, salt)?;

    // Verify the MAC before touching the cipher.  The tag covers
    // aad || iv || ct and is compared in constant time.
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key.as_ref())
        .map_err(|e| VaultError::Fatal(format!("invalid HMAC key: {e}")))?;
    if !aad.is_empty() {
        mac.update(aad);
    }
    mac.update(iv);
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    if !bool::from(expected.as_slice().ct_eq(mac_tag)) {
        return Err(VaultError::AuthFailure);
    }

    let mut cipher = Aes256Ctr::new_from_slices(enc_key.as_ref(), iv)
        .map_err(|_| VaultError::AuthFailure)?;
    let mut plaintext = body.to_vec();
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}

/// HKDF-SHA256(key, salt, "vault/envelope/v1") -> 64 bytes: the first
/// 32 key AES-CTR, the next 32 key the HMAC.
fn derive_legacy_keys(key: &[u8], salt: &[u8]) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)> {
    let hk = Hkdf::<Sha256>::new(Some(salt), key);
    let mut okm = Zeroizing::new([0u8; 64]);
    hk.expand(HKDF_INFO_V1, okm.as_mut())
        .map_err(|e| VaultError::Fatal(format!("HKDF expand failed: {e}")))?;

    let mut enc_key = Zeroizing::new([0u8; 32]);
    let mut mac_key = Zeroizing::new([0u8; 32]);
    enc_key.copy_from_slice(&okm[..32]);
    mac_key.copy_from_slice(&okm[32..]);
    Ok((enc_key, mac_key))
}

// ---------------------------------------------------------------------------
// XChaCha20-Poly1305: nonce || ct  (item payloads and DEK wraps)
// ---------------------------------------------------------------------------

/// Seal `plaintext` under `key` with XChaCha20-Poly1305.
///
/// The key is used directly, with no per-message derivation.  Only call
/// this with fresh random keys (DEKs) or keys that already rotate with
/// the data they protect (the VRK over DEK wraps).
pub fn seal_xchacha(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let mut nonce = [0u8; XNONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let body = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| VaultError::EncryptionFailed(format!("XChaCha seal failed: {e}")))?;

    let mut out = Vec::with_capacity(XNONCE_LEN + body.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Open an XChaCha20-Poly1305 ciphertext produced by [`seal_xchacha`].
pub fn open_xchacha(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < MIN_XCHACHA_LEN {
        return Err(VaultError::CiphertextTooShort);
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| VaultError::AuthFailure)?;

    let (nonce, body) = ciphertext.split_at(XNONCE_LEN);
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: body, aad })
        .map_err(|_| VaultError::AuthFailure)
}

// ---------------------------------------------------------------------------
// Backward-compatible decode cascade
// ---------------------------------------------------------------------------

/// Try every known format in order: v2, then legacy v1, then XChaCha.
/// First successful decode wins.
///
/// Used on the VRK wrap and the key-directory ciphertext so that vaults
/// written before the v2 envelope stay openable.
pub fn open_any(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let mut any_eligible = false;
    for format in EnvelopeFormat::CASCADE {
        if ciphertext.len() < format.min_len() {
            continue;
        }
        any_eligible = true;
        if let Ok(pt) = format.open(key, ciphertext, aad) {
            return Ok(pt);
        }
    }

    if any_eligible {
        Err(VaultError::AuthFailure)
    } else {
        Err(VaultError::CiphertextTooShort)
    }
}
