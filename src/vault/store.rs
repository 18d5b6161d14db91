//! The vault façade: create, unlock, lock, item CRUD, listing, and
//! master rotation.
//!
//! One `Vault` value owns its key material, the decrypted key
//! directory, and an in-memory meta cache.  Everything that can only
//! exist while unlocked lives inside the private `Session`; locking
//! drops the session and the zero-on-drop key wrappers scrub the VRK.
//! `&mut self` on state-changing operations keeps a single vault
//! instance cooperatively serial.
//!
//! Write ordering matters: the ciphertext blob is stored first, the key
//! directory is flushed last.  A failure in between leaves an orphan
//! blob (unreferenced ciphertext), never a dangling KD entry.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::audit::AuditLog;
use crate::config::Settings;
use crate::crypto::envelope;
use crate::crypto::kdf::{derive_kek, KdfParams};
use crate::crypto::keys::{
    self, item_aad, Dek, Kek, Vrk, AAD_KEY_DIRECTORY,
};
use crate::errors::{Result, VaultError};
use crate::storage::{BlobStore, FileBlobStore, MetaStore};
use crate::vault::format::{
    self, Header, KdItem, KdfHeader, KeyDirectory, CURRENT_VERSION,
};
use crate::vault::item::{Item, ItemMeta, ItemPayload, MetaFilter};

/// Everything that only exists while the vault is unlocked.
struct Session {
    header: Header,
    vrk: Vrk,
    kd: KeyDirectory,
    /// Authoritative within this session; the meta store is a
    /// best-effort mirror.
    meta: HashMap<String, ItemMeta>,
}

impl Session {
    /// Re-seal the key directory into the header and persist it.
    fn flush(&mut self, path: &Path) -> Result<()> {
        let kd_bytes = serde_json::to_vec(&self.kd)
            .map_err(|e| VaultError::Serialization(format!("key directory: {e}")))?;
        self.header.kd_cipher =
            envelope::seal(self.vrk.as_bytes(), &kd_bytes, AAD_KEY_DIRECTORY)?;
        format::write_header(path, &self.header)
    }
}

/// An encrypted vault bound to a header file, a blob store, and an
/// optional meta store.
pub struct Vault {
    path: PathBuf,
    settings: Settings,
    blobs: Box<dyn BlobStore>,
    meta_store: Option<Box<dyn MetaStore>>,
    session: Option<Session>,
    audit: AuditLog,
}

impl Vault {
    /// Open a vault at `path` with a filesystem blob store next to it
    /// (`.<file>.blobs/`) and no meta store.  Settings are loaded from
    /// an optional `.vault.toml` in the same directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let parent = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let settings = Settings::load(&parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vault".to_string());
        let blob_dir = parent.join(format!(".{file_name}{}", settings.blob_dir_suffix));
        let blobs = Box::new(FileBlobStore::new(blob_dir)?);

        Ok(Self {
            path,
            settings,
            blobs,
            meta_store: None,
            session: None,
            audit: AuditLog::new(),
        })
    }

    /// Open a vault with caller-supplied stores.
    pub fn with_stores(
        path: impl Into<PathBuf>,
        blobs: Box<dyn BlobStore>,
        meta_store: Option<Box<dyn MetaStore>>,
    ) -> Self {
        Self {
            path: path.into(),
            settings: Settings::default(),
            blobs,
            meta_store,
            session: None,
            audit: AuditLog::new(),
        }
    }

    /// Path of the header file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether key material is currently held in memory.
    pub fn is_unlocked(&self) -> bool {
        self.session.is_some()
    }

    /// The operation log for this instance.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a fresh vault using the configured KDF profile.
    ///
    /// Fails with `VaultExists` if `path` already holds header content.
    /// Leaves the vault unlocked.
    pub fn create(&mut self, master: &[u8]) -> Result<()> {
        let params = self.settings.kdf_params()?;
        self.create_with_kdf(master, params)
    }

    /// Create a fresh vault with explicit KDF parameters.
    pub fn create_with_kdf(&mut self, master: &[u8], params: KdfParams) -> Result<()> {
        if self.path.exists() && fs::metadata(&self.path)?.len() > 0 {
            return Err(VaultError::VaultExists(self.path.clone()));
        }

        let mut kek_bytes = derive_kek(master, &params)?;
        let kek = Kek::from_bytes(kek_bytes);
        kek_bytes.zeroize();

        let vrk = Vrk::generate();
        let vrk_wrap = keys::wrap_vrk(&kek, &vrk)?;
        drop(kek);

        let header = Header {
            version: CURRENT_VERSION,
            kdf: KdfHeader {
                algo: "argon2id".to_string(),
                m: params.m,
                t: params.t,
                p: params.p,
                salt: params.salt,
            },
            vrk_wrap,
            kd_cipher: Vec::new(),
            padding: None,
        };

        let mut session = Session {
            header,
            vrk,
            kd: KeyDirectory::empty(),
            meta: HashMap::new(),
        };
        session.flush(&self.path)?;
        self.session = Some(session);

        self.audit.append("create");
        Ok(())
    }

    /// Unlock an existing vault.
    ///
    /// Wrong passphrase surfaces as `AuthFailure`; an unreadable header
    /// or key directory surfaces as `InvalidState`.
    pub fn unlock(&mut self, master: &[u8]) -> Result<()> {
        let header = format::read_header(&self.path)?;

        if header.kdf.algo != "argon2id" {
            return Err(VaultError::InvalidState(format!(
                "unsupported KDF algorithm '{}'",
                header.kdf.algo
            )));
        }
        let params = KdfParams {
            m: header.kdf.m,
            t: header.kdf.t,
            p: header.kdf.p,
            salt: header.kdf.salt.clone(),
        };

        let mut kek_bytes = derive_kek(master, &params)?;
        let kek = Kek::from_bytes(kek_bytes);
        kek_bytes.zeroize();

        let vrk = keys::unwrap_vrk(&kek, &header.vrk_wrap)?;
        drop(kek);

        let kd_bytes = Zeroizing::new(envelope::open_any(
            vrk.as_bytes(),
            &header.kd_cipher,
            AAD_KEY_DIRECTORY,
        )?);
        let kd: KeyDirectory = serde_json::from_slice(&kd_bytes)
            .map_err(|e| VaultError::InvalidState(format!("key directory JSON: {e}")))?;

        self.session = Some(Session {
            header,
            vrk,
            kd,
            meta: HashMap::new(),
        });

        self.audit.append("unlock");
        Ok(())
    }

    /// Drop all key material and the decrypted key directory.
    /// Idempotent.
    pub fn lock(&mut self) {
        if self.session.take().is_some() {
            self.audit.append("lock");
        }
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Seal and store a new item; returns its minted ID.
    pub fn add_item(&mut self, item: Item) -> Result<String> {
        let session = self.session.as_mut().ok_or(VaultError::NotUnlocked)?;

        let id = mint_id();
        let dek = Dek::generate();
        let now = Utc::now().timestamp();

        let payload = ItemPayload {
            item_type: item.item_type,
            fields: item.fields,
            created: now,
            updated: now,
            version: 1,
        };
        let ciphertext = seal_payload(&dek, &id, &payload)?;

        let meta = ItemMeta {
            id: id.clone(),
            item_type: payload.item_type.clone(),
            created: payload.created,
            updated: payload.updated,
            version: payload.version,
        };

        let dek_wrap = keys::wrap_dek(&session.vrk, &dek, &id)?;
        session.kd.items.insert(
            id.clone(),
            KdItem {
                dek_wrap,
                meta_mac: None,
            },
        );

        self.blobs.put(&id, &ciphertext)?;

        session.meta.insert(id.clone(), meta.clone());
        if let Some(store) = &self.meta_store {
            // Best-effort: the key directory is the source of truth.
            let _ = store.put_meta(&meta);
        }

        session.flush(&self.path)?;
        self.audit.append(&format!("add_item {id}"));
        Ok(id)
    }

    /// Decrypt and return an item.  Only `type` and `fields` come back;
    /// timestamps and version stay sealed on disk.
    pub fn get_item(&self, id: &str) -> Result<Item> {
        let session = self.session.as_ref().ok_or(VaultError::NotUnlocked)?;
        let entry = session
            .kd
            .items
            .get(id)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        let dek = keys::unwrap_dek(&session.vrk, &entry.dek_wrap, id)?;
        let ciphertext = self.blobs.get(id)?;
        let payload = open_payload(&dek, id, &ciphertext)?;

        Ok(Item {
            item_type: payload.item_type,
            fields: payload.fields,
        })
    }

    /// Replace an item's contents in place.
    ///
    /// The existing DEK is reused; `created` is preserved and `version`
    /// increments.  When the meta cache has no entry (fresh unlock),
    /// both are recovered from the current sealed payload.
    pub fn update_item(&mut self, id: &str, upd: Item) -> Result<()> {
        let session = self.session.as_mut().ok_or(VaultError::NotUnlocked)?;
        let entry = session
            .kd
            .items
            .get(id)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let dek = keys::unwrap_dek(&session.vrk, &entry.dek_wrap, id)?;

        let (created, prev_version) = match session.meta.get(id) {
            Some(meta) => (meta.created, meta.version),
            None => {
                let ciphertext = self.blobs.get(id)?;
                let prev = open_payload(&dek, id, &ciphertext)?;
                (prev.created, prev.version)
            }
        };

        let now = Utc::now().timestamp();
        let payload = ItemPayload {
            item_type: upd.item_type,
            fields: upd.fields,
            created,
            updated: now,
            version: prev_version + 1,
        };
        let ciphertext = seal_payload(&dek, id, &payload)?;

        self.blobs.put(id, &ciphertext)?;

        let meta = ItemMeta {
            id: id.to_string(),
            item_type: payload.item_type.clone(),
            created,
            updated: now,
            version: payload.version,
        };
        session.meta.insert(id.to_string(), meta.clone());
        if let Some(store) = &self.meta_store {
            let _ = store.put_meta(&meta);
        }

        session.flush(&self.path)?;
        self.audit.append(&format!("update_item {id}"));
        Ok(())
    }

    /// Remove an item: KD entry, blob (best-effort), and meta.
    /// Deleting an absent item is not an error.
    pub fn delete_item(&mut self, id: &str) -> Result<()> {
        let session = self.session.as_mut().ok_or(VaultError::NotUnlocked)?;
        session.kd.items.remove(id);
        session.meta.remove(id);

        // Best-effort: a blob that is already gone stays gone.
        let _ = self.blobs.delete(id);

        session.flush(&self.path)?;
        self.audit.append(&format!("delete_item {id}"));
        Ok(())
    }

    /// List item metadata, filtered by type.
    ///
    /// Uses the meta store when one is configured, else the in-memory
    /// cache.  Either way, only `ItemMeta` shapes come back.
    pub fn list(&self, filter: &MetaFilter) -> Result<Vec<ItemMeta>> {
        let session = self.session.as_ref().ok_or(VaultError::NotUnlocked)?;

        if let Some(store) = &self.meta_store {
            return store.list_meta(filter);
        }

        Ok(session
            .meta
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Re-wrap the VRK under a KEK derived from `new_master` with the
    /// configured KDF profile and a fresh salt.
    ///
    /// Only `kdf` and `vrk_wrap` change; the VRK itself, every DEK
    /// wrap, and every blob stay byte-identical.
    pub fn rotate_master(&mut self, new_master: &[u8]) -> Result<()> {
        let params = self.settings.kdf_params()?;
        self.rotate_master_with_kdf(new_master, params)
    }

    /// Master rotation with explicit KDF parameters.
    pub fn rotate_master_with_kdf(&mut self, new_master: &[u8], params: KdfParams) -> Result<()> {
        let session = self.session.as_mut().ok_or(VaultError::NotUnlocked)?;

        let mut kek_bytes = derive_kek(new_master, &params)?;
        let kek = Kek::from_bytes(kek_bytes);
        kek_bytes.zeroize();

        let vrk_wrap = keys::wrap_vrk(&kek, &session.vrk)?;
        drop(kek);

        session.header.kdf = KdfHeader {
            algo: "argon2id".to_string(),
            m: params.m,
            t: params.t,
            p: params.p,
            salt: params.salt,
        };
        session.header.vrk_wrap = vrk_wrap;
        format::write_header(&self.path, &session.header)?;

        self.audit.append("rotate_master");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Mint a 128-bit random item ID, rendered as 32 hex characters.
/// Callers must treat the string as opaque.
fn mint_id() -> String {
    let mut token = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut token);
    hex::encode(token)
}

fn seal_payload(dek: &Dek, id: &str, payload: &ItemPayload) -> Result<Vec<u8>> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload)
            .map_err(|e| VaultError::Serialization(format!("item payload: {e}")))?,
    );
    envelope::seal_xchacha(dek.as_bytes(), &plaintext, &item_aad(id))
}

fn open_payload(dek: &Dek, id: &str, ciphertext: &[u8]) -> Result<ItemPayload> {
    let plaintext = Zeroizing::new(envelope::open_xchacha(
        dek.as_bytes(),
        ciphertext,
        &item_aad(id),
    )?);
    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::InvalidState(format!("item payload JSON: {e}")))
}
