// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Fleetdoc.

use thiserror::Error;

/// Top-level error type for all Fleetdoc operations.
#[derive(Debug, Error)]
pub enum FleetdocError {
    // -- Media errors --
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("image encoding failed: {0}")]
    ImageEncoding(String),

    // -- Document errors --
    #[error("protocol document could not be rendered: {0}")]
    Render(String),

    // -- Integrity errors --
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("invalid manifest entry: {0}")]
    InvalidManifestEntry(String),

    // -- Protocol model --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("protocol cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    // -- Storage / persistence --
    #[error("object not found in storage: {0}")]
    StorageNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FleetdocError>;
