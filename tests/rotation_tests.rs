//! Master-rotation end-to-end tests.

use std::collections::HashMap;
use std::fs;

use tempfile::TempDir;

use secretvault::crypto::kdf::{generate_salt, KdfParams};
use secretvault::storage::FileBlobStore;
use secretvault::vault::format;
use secretvault::vault::{Item, MetaFilter, Vault};
use secretvault::VaultError;

fn fast_kdf() -> KdfParams {
    KdfParams {
        m: 8_192,
        t: 1,
        p: 1,
        salt: generate_salt().to_vec(),
    }
}

/// Rotate the master passphrase and verify that only the KDF block and
/// the VRK wrap change: every item blob stays byte-identical and every
/// item decrypts to its pre-rotation value.
#[test]
fn rotation_rewraps_vrk_and_leaves_blobs_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v.vlt");
    let blob_dir = dir.path().join("blobs");
    let blobs = Box::new(FileBlobStore::new(&blob_dir).unwrap());
    let mut vault = Vault::with_stores(&path, blobs, None);

    let old_master = b"correct horse battery staple";
    let new_master = b"Tr0ubadour&3";

    vault.create_with_kdf(old_master, fast_kdf()).unwrap();
    let id = vault
        .add_item(Item {
            item_type: "login".to_string(),
            fields: HashMap::from([
                ("site".to_string(), "example.com".to_string()),
                ("username".to_string(), "alice".to_string()),
                ("password".to_string(), "s3cret!".to_string()),
            ]),
        })
        .unwrap();

    let header_before = format::read_header(&path).unwrap();
    let blob_path = blob_dir.join(format!("{id}.blob"));
    let blob_before = fs::read(&blob_path).unwrap();

    vault
        .rotate_master_with_kdf(new_master, fast_kdf())
        .unwrap();

    let header_after = format::read_header(&path).unwrap();
    assert_ne!(
        header_before.vrk_wrap, header_after.vrk_wrap,
        "vrk_wrap must change on rotation"
    );
    assert_ne!(
        header_before.kdf.salt, header_after.kdf.salt,
        "KDF salt must be fresh on rotation"
    );
    assert_eq!(
        header_before.kd_cipher, header_after.kd_cipher,
        "rotation must not touch the key directory ciphertext"
    );

    let blob_after = fs::read(&blob_path).unwrap();
    assert_eq!(
        blob_before, blob_after,
        "item blobs must be byte-identical across rotation"
    );

    // Old passphrase is dead, new one opens everything.
    vault.lock();
    assert!(matches!(
        vault.unlock(old_master),
        Err(VaultError::AuthFailure)
    ));
    vault.unlock(new_master).expect("unlock with rotated master");

    let item = vault.get_item(&id).unwrap();
    assert_eq!(item.fields["password"], "s3cret!");
}

#[test]
fn rotation_requires_unlock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locked.vlt");
    let blobs = Box::new(FileBlobStore::new(dir.path().join("blobs")).unwrap());
    let mut vault = Vault::with_stores(&path, blobs, None);

    vault.create_with_kdf(b"pw", fast_kdf()).unwrap();
    vault.lock();

    assert!(matches!(
        vault.rotate_master_with_kdf(b"new", fast_kdf()),
        Err(VaultError::NotUnlocked)
    ));
}

#[test]
fn items_added_before_rotation_survive_multiple_rotations() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("multi.vlt");
    let blobs = Box::new(FileBlobStore::new(dir.path().join("blobs")).unwrap());
    let mut vault = Vault::with_stores(&path, blobs, None);

    vault.create_with_kdf(b"m1", fast_kdf()).unwrap();
    let id = vault
        .add_item(Item {
            item_type: "note".to_string(),
            fields: HashMap::from([("body".to_string(), "still here".to_string())]),
        })
        .unwrap();

    vault.rotate_master_with_kdf(b"m2", fast_kdf()).unwrap();
    vault.rotate_master_with_kdf(b"m3", fast_kdf()).unwrap();

    vault.lock();
    vault.unlock(b"m3").unwrap();
    assert_eq!(vault.get_item(&id).unwrap().fields["body"], "still here");

    // Items added under the rotated master coexist with old ones.
    let id2 = vault
        .add_item(Item {
            item_type: "note".to_string(),
            fields: HashMap::from([("body".to_string(), "new era".to_string())]),
        })
        .unwrap();
    assert_eq!(vault.get_item(&id2).unwrap().fields["body"], "new era");
    // Without a meta store, the listing cache only knows items touched
    // in this session.
    let metas = vault.list(&MetaFilter::all()).unwrap();
    assert!(metas.iter().any(|m| m.id == id2));
}
