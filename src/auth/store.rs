//! Persisted credential records.
//!
//! The store is a shared external resource but is only ever written by the
//! authentication state machine: a record is saved on successful login and
//! removed on logout or on an unrecoverable authentication failure. Expiry
//! is the store's concern, not this crate's — records are written without
//! one.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

// ============================================================================
// CredentialRecord
// ============================================================================

/// A persisted principal/secret pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Principal identifier.
    pub principal: String,

    /// Secret or ticket value.
    pub secret: String,
}

// ============================================================================
// CredentialStore
// ============================================================================

/// Scoped credential storage keyed by a configurable storage key.
pub trait CredentialStore: Send + Sync {
    /// Loads the stored record, if any.
    fn load(&self) -> Result<Option<CredentialRecord>>;

    /// Saves a record, replacing any previous one.
    fn save(&self, record: &CredentialRecord) -> Result<()>;

    /// Removes the stored record. Removing an absent record is not an error.
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// File-backed store: one JSON file named after the storage key.
///
/// Writes go through a temp file and rename so a crash mid-write never
/// leaves a truncated record.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store writing `<dir>/<storage_key>.json`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, storage_key: &str) -> Self {
        let mut path = dir.into();
        path.push(format!("{storage_key}.json"));
        Self { path }
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_vec(record)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, encoded)?;

        if let Err(rename_err) = fs::rename(&temp, &self.path) {
            // Windows refuses to replace an existing file via rename.
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    let _ = fs::remove_file(&temp);
                    debug!(error = %rename_err, "Rename failed and target not removable");
                    return Err(err.into());
                }
            }
            fs::rename(&temp, &self.path)?;
        }

        debug!(path = %self.path.display(), "Credential record saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Credential record removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<CredentialRecord>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        *self.slot.lock() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CredentialRecord {
        CredentialRecord {
            principal: "alice".to_string(),
            secret: "t1ck3t".to_string(),
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path(), "auth_token");

        assert_eq!(store.load().expect("load"), None);

        store.save(&record()).expect("save");
        assert_eq!(store.load().expect("load"), Some(record()));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path(), "auth_token");

        store.clear().expect("first clear");
        store.clear().expect("second clear");
    }

    #[test]
    fn test_file_store_path_uses_storage_key() {
        let store = FileCredentialStore::new("/tmp/creds", "custom_key");
        assert!(store.path().ends_with("custom_key.json"));
    }

    #[test]
    fn test_file_store_save_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path(), "auth_token");

        store.save(&record()).expect("save");
        let updated = CredentialRecord {
            principal: "bob".to_string(),
            secret: "other".to_string(),
        };
        store.save(&updated).expect("replace");

        assert_eq!(store.load().expect("load"), Some(updated));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load().expect("load"), None);

        store.save(&record()).expect("save");
        assert_eq!(store.load().expect("load"), Some(record()));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
    }
}
