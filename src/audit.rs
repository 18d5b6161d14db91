//! Hash-chained operation log.
//!
//! Every state-changing vault operation appends an entry whose hash
//! covers the previous entry's hash, so truncating or editing the
//! middle of the log breaks verification.  The chain lives in memory
//! with the vault instance; it is an operational trace, not a synced
//! artifact.

use chrono::Utc;
use sha2::{Digest, Sha256};

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Unix seconds.
    pub ts: i64,
    /// What happened, e.g. "add_item 3f2a...".
    pub what: String,
    /// Hex SHA-256 over the previous hash and `what`.
    pub hash: String,
}

/// Append-only hash chain of vault operations.
#[derive(Debug, Default)]
pub struct AuditLog {
    last_hash: Vec<u8>,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, extending the chain.
    pub fn append(&mut self, what: &str) -> AuditEntry {
        let mut hasher = Sha256::new();
        hasher.update(&self.last_hash);
        hasher.update(what.as_bytes());
        let sum = hasher.finalize();

        self.last_hash = sum.to_vec();
        let entry = AuditEntry {
            ts: Utc::now().timestamp(),
            what: what.to_string(),
            hash: hex::encode(sum),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Replay the chain and check every link.
    pub fn verify(&self) -> bool {
        let mut prev: Vec<u8> = Vec::new();
        for entry in &self.entries {
            let mut hasher = Sha256::new();
            hasher.update(&prev);
            hasher.update(entry.what.as_bytes());
            let sum = hasher.finalize();
            if hex::encode(sum) != entry.hash {
                return false;
            }
            prev = sum.to_vec();
        }
        true
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.clone()
    }
}
