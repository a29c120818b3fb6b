// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! fleetdoc-security: integrity primitives for archived protocol documents.
//!
//! Every original photo, derivative and generated PDF is fingerprinted with
//! SHA-256. The fingerprints are collected into a [`DocumentManifest`] so a
//! stored document set can be re-verified byte for byte later.

pub mod integrity;
pub mod manifest;

pub use integrity::{hash_bytes, verify, verify_hash};
pub use manifest::{DocumentManifest, MANIFEST_FORMAT_VERSION, ManifestEntry, build_manifest};
