//! Integration tests for the vault façade.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use secretvault::crypto::envelope::{open_any, seal};
use secretvault::crypto::kdf::{derive_kek, generate_salt, KdfParams};
use secretvault::crypto::keys::{self, Kek, AAD_KEY_DIRECTORY};
use secretvault::storage::{FileBlobStore, MemoryMetaStore};
use secretvault::vault::format::{self, KeyDirectory};
use secretvault::vault::{Item, MetaFilter, Vault};
use secretvault::VaultError;

/// Small Argon2 parameters so tests stay fast; production profiles are
/// exercised separately in the kdf module.
fn fast_kdf() -> KdfParams {
    KdfParams {
        m: 8_192,
        t: 1,
        p: 1,
        salt: generate_salt().to_vec(),
    }
}

/// Helper: a vault backed by a blob directory inside a fresh temp dir.
fn test_vault(dir: &TempDir) -> (Vault, PathBuf, PathBuf) {
    let path = dir.path().join("test.vlt");
    let blob_dir = dir.path().join("blobs");
    let blobs = Box::new(FileBlobStore::new(&blob_dir).expect("blob dir"));
    (Vault::with_stores(&path, blobs, None), path, blob_dir)
}

fn login_item(password: &str) -> Item {
    Item {
        item_type: "login".to_string(),
        fields: HashMap::from([
            ("site".to_string(), "example.com".to_string()),
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), password.to_string()),
        ]),
    }
}

// ---------------------------------------------------------------------------
// Create / unlock / lock state machine
// ---------------------------------------------------------------------------

#[test]
fn create_then_relock_and_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);
    let master = b"correct horse battery staple";

    vault.create_with_kdf(master, fast_kdf()).expect("create");
    assert!(vault.is_unlocked());

    let id = vault.add_item(login_item("s3cret!")).expect("add");

    vault.lock();
    assert!(!vault.is_unlocked());

    vault.unlock(master).expect("unlock");
    let item = vault.get_item(&id).expect("get after unlock");
    assert_eq!(item.item_type, "login");
    assert_eq!(item.fields["password"], "s3cret!");
}

#[test]
fn create_fails_on_existing_vault() {
    let dir = TempDir::new().unwrap();
    let (mut vault, path, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();

    let (mut second, _, _) = test_vault(&dir);
    assert!(path.exists());
    assert!(matches!(
        second.create_with_kdf(b"pw", fast_kdf()),
        Err(VaultError::VaultExists(_))
    ));
}

#[test]
fn unlock_with_wrong_passphrase_is_auth_failure() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"right", fast_kdf()).unwrap();
    vault.lock();

    assert!(matches!(
        vault.unlock(b"wrong"),
        Err(VaultError::AuthFailure)
    ));
    assert!(!vault.is_unlocked());
}

#[test]
fn unlock_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    assert!(matches!(
        vault.unlock(b"pw"),
        Err(VaultError::VaultNotFound(_))
    ));
}

#[test]
fn corrupted_header_is_invalid_state() {
    let dir = TempDir::new().unwrap();
    let (mut vault, path, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    vault.lock();

    fs::write(&path, b"{ not json").unwrap();
    assert!(matches!(
        vault.unlock(b"pw"),
        Err(VaultError::InvalidState(_))
    ));
}

#[test]
fn lock_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    vault.lock();
    vault.lock();
    assert!(!vault.is_unlocked());
}

#[test]
fn item_operations_require_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();
    vault.lock();

    assert!(matches!(
        vault.add_item(login_item("y")),
        Err(VaultError::NotUnlocked)
    ));
    assert!(matches!(vault.get_item(&id), Err(VaultError::NotUnlocked)));
    assert!(matches!(
        vault.update_item(&id, login_item("z")),
        Err(VaultError::NotUnlocked)
    ));
    assert!(matches!(
        vault.delete_item(&id),
        Err(VaultError::NotUnlocked)
    ));
    assert!(matches!(
        vault.list(&MetaFilter::all()),
        Err(VaultError::NotUnlocked)
    ));
}

// ---------------------------------------------------------------------------
// Default construction and settings
// ---------------------------------------------------------------------------

#[test]
fn vault_new_uses_settings_and_blob_dir_convention() {
    let dir = TempDir::new().unwrap();
    // Keep Argon2 small for the test via config overrides.
    fs::write(
        dir.path().join(".vault.toml"),
        "argon2_memory_kib = 8192\nargon2_iterations = 1\nargon2_parallelism = 1\n",
    )
    .unwrap();

    let path = dir.path().join("personal.vlt");
    let mut vault = Vault::new(&path).expect("construct");
    vault.create(b"pw").expect("create with configured KDF");
    let id = vault.add_item(login_item("x")).unwrap();

    // Blobs land in the hidden sibling directory named after the file.
    let blob_path = dir
        .path()
        .join(".personal.vlt.blobs")
        .join(format!("{id}.blob"));
    assert!(blob_path.exists());

    vault.lock();
    vault.unlock(b"pw").unwrap();
    assert_eq!(vault.get_item(&id).unwrap().fields["password"], "x");
}

#[test]
fn audit_chain_records_operations() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();
    vault.update_item(&id, login_item("y")).unwrap();
    vault.delete_item(&id).unwrap();
    vault.lock();

    let entries = vault.audit().entries();
    assert!(entries.len() >= 5, "create/add/update/delete/lock recorded");
    assert!(vault.audit().verify(), "chain must verify");
    assert!(entries[1].what.contains(&id));
}

// ---------------------------------------------------------------------------
// Item CRUD
// ---------------------------------------------------------------------------

#[test]
fn add_and_get_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("hunter2")).unwrap();

    let item = vault.get_item(&id).unwrap();
    assert_eq!(item.item_type, "login");
    assert_eq!(item.fields.len(), 3);
    assert_eq!(item.fields["username"], "alice");
}

#[test]
fn get_unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    assert!(matches!(
        vault.get_item("no-such-id"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn get_with_missing_blob_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, blob_dir) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();

    // Simulate a blob store that lost the ciphertext.
    fs::remove_file(blob_dir.join(format!("{id}.blob"))).unwrap();

    assert!(matches!(
        vault.get_item(&id),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn update_preserves_created_and_bumps_version() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("old")).unwrap();

    let before = vault.list(&MetaFilter::all()).unwrap();
    let created = before[0].created;

    vault.update_item(&id, login_item("new")).unwrap();

    let after = vault.list(&MetaFilter::all()).unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].version, 2);
    assert_eq!(after[0].created, created);
    assert!(after[0].updated >= created);

    assert_eq!(vault.get_item(&id).unwrap().fields["password"], "new");
}

#[test]
fn update_after_reunlock_still_preserves_created() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);
    let master = b"pw";

    vault.create_with_kdf(master, fast_kdf()).unwrap();
    let id = vault.add_item(login_item("v1")).unwrap();
    let created = vault.list(&MetaFilter::all()).unwrap()[0].created;

    // A fresh session has an empty meta cache; created/version must be
    // recovered from the sealed payload.
    vault.lock();
    vault.unlock(master).unwrap();
    vault.update_item(&id, login_item("v2")).unwrap();

    let metas = vault.list(&MetaFilter::all()).unwrap();
    assert_eq!(metas[0].version, 2);
    assert_eq!(metas[0].created, created);
    assert_eq!(vault.get_item(&id).unwrap().fields["password"], "v2");
}

#[test]
fn update_unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    assert!(matches!(
        vault.update_item("missing", login_item("x")),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn delete_is_idempotent_and_survives_reunlock() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);
    let master = b"pw";

    vault.create_with_kdf(master, fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();

    vault.delete_item(&id).expect("first delete");
    vault.delete_item(&id).expect("second delete is still ok");

    assert!(matches!(
        vault.get_item(&id),
        Err(VaultError::NotFound(_))
    ));

    // The KD entry must be gone after a fresh unlock too.
    vault.lock();
    vault.unlock(master).unwrap();
    assert!(matches!(
        vault.get_item(&id),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn minted_ids_are_unique() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..32 {
        let id = vault.add_item(login_item("x")).unwrap();
        assert!(seen.insert(id), "minted a duplicate item ID");
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn list_filters_by_type_from_cache() {
    let dir = TempDir::new().unwrap();
    let (mut vault, _, _) = test_vault(&dir);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    vault.add_item(login_item("a")).unwrap();
    vault
        .add_item(Item {
            item_type: "note".to_string(),
            fields: HashMap::from([("body".to_string(), "hello".to_string())]),
        })
        .unwrap();

    assert_eq!(vault.list(&MetaFilter::all()).unwrap().len(), 2);

    let logins = vault.list(&MetaFilter::by_type("login")).unwrap();
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].item_type, "login");
}

#[test]
fn list_uses_meta_store_when_configured() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("meta.vlt");
    let blobs = Box::new(FileBlobStore::new(dir.path().join("blobs")).unwrap());
    let meta_store = Box::new(MemoryMetaStore::new());
    let mut vault = Vault::with_stores(&path, blobs, Some(meta_store));
    let master = b"pw";

    vault.create_with_kdf(master, fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();

    // A fresh session has an empty cache, but the meta store still
    // knows the item.
    vault.lock();
    vault.unlock(master).unwrap();

    let metas = vault.list(&MetaFilter::all()).unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].id, id);
    assert_eq!(metas[0].version, 1);
}

#[test]
fn stale_meta_rows_are_tolerated() {
    // The meta store has no delete in its contract; after an item is
    // removed, listing may still surface its id.  Callers skip it and
    // treat get_item as the authority.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stale.vlt");
    let blobs = Box::new(FileBlobStore::new(dir.path().join("blobs")).unwrap());
    let meta_store = Box::new(MemoryMetaStore::new());
    let mut vault = Vault::with_stores(&path, blobs, Some(meta_store));

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    let id = vault.add_item(login_item("x")).unwrap();
    vault.delete_item(&id).unwrap();

    let metas = vault.list(&MetaFilter::all()).unwrap();
    assert!(metas.iter().any(|m| m.id == id), "stale row expected");
    assert!(matches!(
        vault.get_item(&id),
        Err(VaultError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// DEK-wrap swap attack
// ---------------------------------------------------------------------------

/// Moving one item's dek_wrap onto another item's KD slot must fail at
/// unwrap time: the wrap's AAD carries the original item ID.
#[test]
fn dek_wrap_swap_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut vault, path, blob_dir) = test_vault(&dir);
    let master = b"pw";

    vault.create_with_kdf(master, fast_kdf()).unwrap();
    let id1 = vault.add_item(login_item("first")).unwrap();
    let id2 = vault.add_item(login_item("second")).unwrap();
    vault.lock();

    // Forge the key directory offline, the way an attacker with file
    // access (and, for this test, the passphrase-derived keys) would.
    let header = format::read_header(&path).unwrap();
    let params = KdfParams {
        m: header.kdf.m,
        t: header.kdf.t,
        p: header.kdf.p,
        salt: header.kdf.salt.clone(),
    };
    let kek = Kek::from_bytes(derive_kek(master, &params).unwrap());
    let vrk = keys::unwrap_vrk(&kek, &header.vrk_wrap).unwrap();

    let kd_bytes = open_any(vrk.as_bytes(), &header.kd_cipher, AAD_KEY_DIRECTORY).unwrap();
    let mut kd: KeyDirectory = serde_json::from_slice(&kd_bytes).unwrap();

    let stolen_wrap = kd.items[&id1].dek_wrap.clone();
    kd.items.get_mut(&id2).unwrap().dek_wrap = stolen_wrap;

    let mut forged = header.clone();
    forged.kd_cipher = seal(
        vrk.as_bytes(),
        &serde_json::to_vec(&kd).unwrap(),
        AAD_KEY_DIRECTORY,
    )
    .unwrap();
    format::write_header(&path, &forged).unwrap();

    // Unlock still succeeds: the KD itself is authentic under the VRK.
    let blobs = Box::new(FileBlobStore::new(&blob_dir).unwrap());
    let mut reopened = Vault::with_stores(&path, blobs, None);
    reopened.unlock(master).unwrap();

    // The swapped slot fails authentication; the untouched one works.
    assert!(matches!(
        reopened.get_item(&id2),
        Err(VaultError::AuthFailure)
    ));
    assert_eq!(
        reopened.get_item(&id1).unwrap().fields["password"],
        "first"
    );
}
