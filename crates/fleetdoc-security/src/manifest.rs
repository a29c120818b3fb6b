// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document manifests: the ordered list of files that make up an archived
// protocol, each with its fingerprint and size.

use fleetdoc_core::error::{FleetdocError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::integrity::{hash_bytes, is_hex_digest, verify_hash};

/// Format marker written into every manifest.
pub const MANIFEST_FORMAT_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>, content_hash: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            content_hash: content_hash.into(),
            size,
        }
    }

    /// Fingerprint `bytes` and describe them under `name`.
    pub fn for_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(name, hash_bytes(bytes), bytes.len() as u64)
    }
}

/// Immutable once built; fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentManifest {
    #[serde(rename = "version")]
    format_version: String,
    #[serde(rename = "files")]
    entries: Vec<ManifestEntry>,
    total_size: u64,
}

impl DocumentManifest {
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry recorded under `name`.
    pub fn find(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Check `bytes` against the entry recorded under `name`.
    ///
    /// A size difference is reported as a mismatch too, without hashing.
    pub fn verify_entry(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let entry = self
            .find(name)
            .ok_or_else(|| FleetdocError::InvalidManifestEntry(format!("no entry named {name}")))?;
        if entry.size != bytes.len() as u64 {
            return Err(FleetdocError::IntegrityMismatch {
                expected: entry.content_hash.clone(),
                actual: hash_bytes(bytes),
            });
        }
        verify_hash(bytes, &entry.content_hash)
    }
}

/// Aggregate `entries` into a manifest, preserving their order.
///
/// Rejects an entry with an empty name or a digest that is not 64 hex
/// characters.
pub fn build_manifest(entries: impl IntoIterator<Item = ManifestEntry>) -> Result<DocumentManifest> {
    let mut collected = Vec::new();
    let mut total_size: u64 = 0;

    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(FleetdocError::InvalidManifestEntry(
                "entry name is empty".into(),
            ));
        }
        if !is_hex_digest(&entry.content_hash) {
            return Err(FleetdocError::InvalidManifestEntry(format!(
                "{}: malformed digest {:?}",
                entry.name, entry.content_hash
            )));
        }
        total_size = total_size.saturating_add(entry.size);
        collected.push(entry);
    }

    debug!(entries = collected.len(), total_size, "Manifest built");

    Ok(DocumentManifest {
        format_version: MANIFEST_FORMAT_VERSION.into(),
        entries: collected,
        total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_order() {
        let manifest = build_manifest([
            ManifestEntry::for_bytes("protocol.pdf", b"pdf bytes"),
            ManifestEntry::for_bytes("thumb/p1.webp", b"webp"),
        ])
        .unwrap();
        assert_eq!(manifest.format_version(), "2.0");
        assert_eq!(manifest.total_size(), 13);
        assert_eq!(manifest.entries()[0].name, "protocol.pdf");
        assert_eq!(manifest.entries()[1].name, "thumb/p1.webp");
    }

    #[test]
    fn empty_input_is_valid() {
        let manifest = build_manifest(Vec::new()).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.total_size(), 0);
    }

    #[test]
    fn rejects_empty_name() {
        let err = build_manifest([ManifestEntry::for_bytes("  ", b"x")]).unwrap_err();
        assert!(matches!(err, FleetdocError::InvalidManifestEntry(_)));
    }

    #[test]
    fn rejects_malformed_digest() {
        let err = build_manifest([ManifestEntry::new("a.pdf", "abc", 3)]).unwrap_err();
        assert!(matches!(err, FleetdocError::InvalidManifestEntry(_)));
    }

    #[test]
    fn verify_entry_detects_tampering() {
        let manifest = build_manifest([ManifestEntry::for_bytes("a.pdf", b"original")]).unwrap();
        assert!(manifest.verify_entry("a.pdf", b"original").is_ok());
        assert!(matches!(
            manifest.verify_entry("a.pdf", b"originaL"),
            Err(FleetdocError::IntegrityMismatch { .. })
        ));
        assert!(matches!(
            manifest.verify_entry("missing.pdf", b"original"),
            Err(FleetdocError::InvalidManifestEntry(_))
        ));
    }

    #[test]
    fn serialises_with_archive_field_names() {
        let manifest = build_manifest([ManifestEntry::for_bytes("a.pdf", b"x")]).unwrap();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["version"], "2.0");
        assert_eq!(json["totalSize"], 1);
        assert_eq!(json["files"][0]["name"], "a.pdf");
        assert!(json["files"][0]["hash"].is_string());
    }
}
