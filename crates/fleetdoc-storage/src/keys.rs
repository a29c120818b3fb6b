// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Storage key layout shared by every backend.
//!
//! ```text
//! protocols/{protocol}/photos/{variant}/{photo}.{ext}
//! protocols/{protocol}/pdf/{kind}_protocol_{millis}.pdf
//! protocols/{protocol}/pdf/migrated_{hash16}.pdf
//! protocols/{protocol}/protocol.json
//! ```

use chrono::{DateTime, Utc};
use fleetdoc_core::error::{FleetdocError, Result};

/// Reject keys that are empty, absolute, contain `..` or backslashes, or
/// have empty segments.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FleetdocError::Storage("storage key is empty".into()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(FleetdocError::Storage(format!(
            "storage key contains invalid characters: {key}"
        )));
    }
    if key.split('/').any(str::is_empty) {
        return Err(FleetdocError::Storage(format!(
            "storage key has an empty segment: {key}"
        )));
    }
    Ok(())
}

pub fn protocol_prefix(protocol_id: &str) -> String {
    format!("protocols/{protocol_id}")
}

/// Key of one photo derivative; `variant` is the directory (`thumb`,
/// `gallery`, `pdf`).
pub fn photo_key(protocol_id: &str, variant: &str, photo_id: &str, extension: &str) -> String {
    format!(
        "{}/photos/{variant}/{photo_id}.{extension}",
        protocol_prefix(protocol_id)
    )
}

/// Key of a generated protocol document.
pub fn document_key(protocol_id: &str, kind: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}/pdf/{kind}_protocol_{}.pdf",
        protocol_prefix(protocol_id),
        generated_at.timestamp_millis()
    )
}

/// Key under which a first-generation PDF is preserved during migration.
pub fn migrated_document_key(protocol_id: &str, content_hash: &str) -> String {
    let prefix: String = content_hash.chars().take(16).collect();
    format!("{}/pdf/migrated_{prefix}.pdf", protocol_prefix(protocol_id))
}

/// Key of the serialised protocol record.
pub fn protocol_record_key(protocol_id: &str) -> String {
    format!("{}/protocol.json", protocol_prefix(protocol_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn photo_layout() {
        assert_eq!(
            photo_key("p1", "thumb", "ph1", "webp"),
            "protocols/p1/photos/thumb/ph1.webp"
        );
    }

    #[test]
    fn document_layout() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            document_key("p1", "return", at),
            "protocols/p1/pdf/return_protocol_1735689600000.pdf"
        );
        assert_eq!(
            migrated_document_key("p1", "0123456789abcdef0123"),
            "protocols/p1/pdf/migrated_0123456789abcdef.pdf"
        );
        assert_eq!(protocol_record_key("p1"), "protocols/p1/protocol.json");
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_key("protocols/p1/photos/a.jpg").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key("").is_err());
    }
}
