// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage capability trait.

use std::sync::Arc;

use fleetdoc_core::error::Result;

/// Keyed blob storage.
///
/// Keys are `/`-separated relative paths such as
/// `protocols/{id}/photos/gallery/{photo}.jpg`. Implementations must be
/// shareable across the rayon pool used for derivative generation.
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    ///
    /// Returns `FleetdocError::StorageNotFound` when nothing is stored there.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `bytes` under `key`, replacing any previous content, and return
    /// a locator (path or URL) for the stored object.
    fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<String>;

    /// Whether anything is stored under `key`.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Remove whatever is stored under `key`. Returns `false` when there
    /// was nothing to remove.
    fn delete(&self, key: &str) -> Result<bool>;
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<String> {
        (**self).put(key, bytes, media_type)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for &T {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<String> {
        (**self).put(key, bytes, media_type)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }
}
