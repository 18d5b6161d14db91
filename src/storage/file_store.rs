//! Filesystem blob store: one `<id>.blob` file per item.
//!
//! The directory is created with mode 0700 and each blob written with
//! mode 0600.  IDs are validated before touching the filesystem so a
//! hostile ID can never become a path traversal.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, VaultError};
use crate::storage::BlobStore;

/// Blob store backed by a directory of `<id>.blob` files.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) a blob directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self { dir })
    }

    /// Directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.blob")))
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(id)?;
        fs::write(&path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(id)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.blob_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Allow only characters that can appear in minted IDs.
///
/// Hex tokens and the historical decimal timestamps both pass; path
/// separators and dot-dot sequences cannot.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(VaultError::Storage("empty blob id".into()));
    }
    if id.len() > 128 {
        return Err(VaultError::Storage("blob id too long".into()));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(VaultError::Storage(format!(
            "blob id '{id}' contains invalid characters"
        )));
    }
    Ok(())
}
