//! Content-addressed upload ledger.
//!
//! The ledger maps a file's base name to the [`FingerprintRecord`] of its last
//! acknowledged upload. A file counts as already uploaded only when a record
//! exists under its name **and** the stored hash equals the hash of the bytes
//! currently on disk, so editing a file makes it eligible for upload again.
//!
//! The whole map is loaded once per run and rewritten after every mutation.
//! Writes go through a temporary sibling file and a rename, so an interrupted
//! run leaves either the previous snapshot or the new one on disk.
//!
//! Failures here never abort a batch:
//! - an unreadable or corrupt ledger loads as empty (files get re-uploaded);
//! - an unreadable file is reported as "not uploaded" so the upload step can
//!   fail on it with a real error;
//! - a failed save is logged and the in-memory record is kept.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::models::FingerprintRecord;

/// Snapshot persisted on disk, keyed by base file name.
pub type Ledger = BTreeMap<String, FingerprintRecord>;

/// Content identity of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub size: u64,
}

/// Hash a file's bytes with SHA-256.
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(Fingerprint {
        hash: hex::encode(hasher.finalize()),
        size,
    })
}

/// Ledger key for a path: its base name.
pub fn ledger_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// The fingerprint store: an in-memory [`Ledger`] bound to its file.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    records: Ledger,
}

impl LedgerStore {
    /// Load the ledger at `path`. Never fails: a missing file is an empty
    /// ledger, and a read or parse error is logged and treated the same way.
    pub fn load(path: &Path) -> Self {
        let records = match read_ledger(path) {
            Ok(records) => {
                debug!("loaded {} ledger record(s) from {:?}", records.len(), path);
                records
            }
            Err(e) => {
                warn!("Could not load upload ledger {}: {:#}", path.display(), e);
                Ledger::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &Ledger {
        &self.records
    }

    pub fn get(&self, file_name: &str) -> Option<&FingerprintRecord> {
        self.records.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when this exact content was already acknowledged under the file's name.
    pub fn is_uploaded(&self, path: &Path) -> bool {
        let Some(record) = self.records.get(&ledger_key(path)) else {
            return false;
        };
        match fingerprint(path) {
            Ok(fp) => !record.content_hash.is_empty() && record.content_hash == fp.hash,
            Err(e) => {
                warn!("Could not hash {}: {:#}", path.display(), e);
                false
            }
        }
    }

    /// Record a successful upload of `path` into `collection_name` and flush.
    ///
    /// Errors only when the file can no longer be hashed; in that case the
    /// ledger is left untouched. A failed flush is logged, not returned.
    pub fn mark_uploaded(&mut self, path: &Path, collection_name: &str) -> Result<()> {
        let fp = fingerprint(path)?;
        let record = FingerprintRecord {
            content_hash: fp.hash,
            size_bytes: fp.size,
            collection_name: collection_name.to_string(),
            uploaded_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            source_path: path.to_string_lossy().to_string(),
        };
        self.records.insert(ledger_key(path), record);

        if let Err(e) = self.save() {
            error!("Failed to save upload ledger {}: {:#}", self.path.display(), e);
        }
        Ok(())
    }

    /// Remove a record; returns whether one existed. Flushes on change.
    pub fn forget(&mut self, file_name: &str) -> Result<bool> {
        if self.records.remove(file_name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Rewrite the whole ledger as pretty-printed UTF-8 JSON.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = tmp_path(&self.path);
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!("persisted {} ledger record(s) to {:?}", self.records.len(), self.path);
        Ok(())
    }
}

fn read_ledger(path: &Path) -> Result<Ledger> {
    if !path.exists() {
        return Ok(Ledger::new());
    }
    let data = std::fs::read_to_string(path)?;
    let records: Ledger = serde_json::from_str(&data).context("invalid ledger JSON")?;
    Ok(records)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
