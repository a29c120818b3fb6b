// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// fleetdoc-migration: converts first-generation protocol records into the
// current protocol shape, re-deriving photos and regenerating documents,
// with bounded progress accounting.

pub mod legacy;
pub mod progress;
pub mod service;

pub use legacy::{LegacyPayload, LegacyProtocolRecord, LegacyValidationError, is_valid_legacy_protocol};
pub use progress::{MigrationErrorEntry, MigrationProgress};
pub use service::{MigratedProtocol, MigrationOptions, MigrationService};
