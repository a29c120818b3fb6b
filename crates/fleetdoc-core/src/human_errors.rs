// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages for the back-office UI.
//
// Every technical error is mapped to a plain sentence with a concrete next
// step. Severity drives presentation (toast, banner, blocking dialog).

use crate::error::FleetdocError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Storage blip or busy disk; retrying is expected to work.
    Transient,
    /// The operator must fix the protocol or re-upload something.
    ActionRequired,
    /// Retrying with the same input will fail again.
    Permanent,
}

/// A human-readable error with a message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Short summary (shown as a heading).
    pub message: String,
    /// What the operator should try (shown as body text).
    pub suggestion: String,
    /// Whether the caller may retry automatically.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `FleetdocError` into a `HumanError` an operator can act on.
pub fn humanize_error(err: &FleetdocError) -> HumanError {
    match err {
        // -- Media --
        FleetdocError::UnsupportedMedia(detail) => HumanError {
            message: "This photo could not be read.".into(),
            suggestion: format!(
                "Upload the photo again as JPEG, PNG or WebP. Very large panoramas are rejected. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        FleetdocError::ImageEncoding(_) => HumanError {
            message: "Preview images could not be created.".into(),
            suggestion: "Try again. If this keeps happening, please report it with the photo attached.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Documents --
        FleetdocError::Render(detail) => humanize_render_error(detail),

        // -- Integrity --
        FleetdocError::IntegrityMismatch { .. } => HumanError {
            message: "This file has been changed since it was archived.".into(),
            suggestion: "The stored copy does not match its recorded fingerprint. Restore it from backup before relying on it.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        FleetdocError::InvalidManifestEntry(_) => HumanError {
            message: "The file list for this document is incomplete.".into(),
            suggestion: "Regenerate the protocol document to rebuild its file list.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Protocol model --
        FleetdocError::Validation(detail) => HumanError {
            message: "Some protocol details are missing or invalid.".into(),
            suggestion: format!("Check the protocol and fill in the missing fields. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        FleetdocError::InvalidTransition { reason, .. } => HumanError {
            message: "This protocol can't be changed that way.".into(),
            suggestion: format!("Completed and cancelled protocols are locked. ({reason})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Storage --
        FleetdocError::StorageNotFound(key) => HumanError {
            message: "A stored file is missing.".into(),
            suggestion: format!("The file may have been deleted. Upload it again. (Key: {key})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        FleetdocError::Storage(_) => HumanError {
            message: "File storage is not responding.".into(),
            suggestion: "Wait a moment and try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        FleetdocError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The file couldn't be found.".into(),
                suggestion: "It may have been moved or deleted. Choose the file again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "Fleetdoc doesn't have permission to use that file.".into(),
                suggestion: "Check the file and folder permissions.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        FleetdocError::Serialization(_) => HumanError {
            message: "The protocol data could not be read.".into(),
            suggestion: "The record may be malformed. Check it was exported from a supported version.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

fn humanize_render_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("license plate") || lower.contains("customer") || lower.contains("condition") {
        HumanError {
            message: "The protocol document can't be created yet.".into(),
            suggestion: format!("Fill in the vehicle, customer and condition details first. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: "The protocol document could not be created.".into(),
            suggestion: format!("Try again. If this keeps happening, please report it. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}
