// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory blob store for tests and dry runs.

use std::collections::HashMap;

use fleetdoc_core::error::{FleetdocError, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::keys::validate_key;
use crate::traits::BlobStore;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    media_type: String,
}

/// Blob store backed by a `HashMap`. Cheap to create, lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Media type recorded by the last `put` for `key`.
    pub fn media_type(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).map(|blob| blob.media_type.clone())
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(key)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| FleetdocError::StorageNotFound(key.to_owned()))
    }

    fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<String> {
        validate_key(key)?;
        self.blobs.write().insert(
            key.to_owned(),
            StoredBlob {
                bytes: bytes.to_vec(),
                media_type: media_type.to_owned(),
            },
        );
        debug!(key, size = bytes.len(), "Stored blob in memory");
        Ok(format!("memory://{key}"))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.blobs.write().remove(key).is_some();
        debug!(key, removed, "Deleted blob from memory");
        Ok(removed)
    }
}
