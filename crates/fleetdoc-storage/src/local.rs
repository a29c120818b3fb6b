// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local filesystem blob store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fleetdoc_core::error::{FleetdocError, Result};
use tracing::{debug, info};

use crate::keys::validate_key;
use crate::traits::BlobStore;

/// Stores each blob as a file under a root directory; the key is the
/// relative path.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            FleetdocError::Storage(format!(
                "failed to create storage directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(key, size = bytes.len(), "Read blob from disk");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FleetdocError::StorageNotFound(key.to_owned()))
            }
            Err(e) => Err(FleetdocError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn put(&self, key: &str, bytes: &[u8], _media_type: &str) -> Result<String> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        let mut file = fs::File::create(&path).map_err(|e| {
            FleetdocError::Storage(format!("failed to create {}: {e}", path.display()))
        })?;
        file.write_all(bytes).map_err(|e| {
            FleetdocError::Storage(format!("failed to write {}: {e}", path.display()))
        })?;
        file.sync_all().map_err(|e| {
            FleetdocError::Storage(format!("failed to sync {}: {e}", path.display()))
        })?;

        info!(
            key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Stored blob on disk"
        );
        Ok(path.display().to_string())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.key_to_path(key)?.is_file())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "Deleted blob from disk");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FleetdocError::Storage(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_create_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let key = "protocols/p1/photos/gallery/ph1.jpg";
        let locator = store.put(key, b"jpeg", "image/jpeg").unwrap();
        assert!(Path::new(&locator).is_file());
        assert_eq!(store.get(key).unwrap(), b"jpeg");
        assert!(store.exists(key).unwrap());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("protocols/none.jpg"),
            Err(FleetdocError::StorageNotFound(_))
        ));
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let key = "protocols/p1/protocol.json";
        store.put(key, b"{}", "application/json").unwrap();
        assert!(store.delete(key).unwrap());
        assert!(!store.exists(key).unwrap());
        assert!(!store.delete(key).unwrap());
        assert!(store.delete("../outside.json").is_err());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("root")).unwrap();
        assert!(store.put("../escape.txt", b"x", "text/plain").is_err());
        assert!(store.get("/etc/passwd").is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
