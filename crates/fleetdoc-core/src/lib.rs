// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fleetdoc core: protocol types, fee arithmetic, configuration and error
// definitions shared across all crates.

pub mod config;
pub mod error;
pub mod fees;
pub mod human_errors;
pub mod types;

pub use config::{DerivativeConfig, DocumentConfig, FeeConfig, FleetdocConfig, MigrationConfig};
pub use error::FleetdocError;
pub use fees::{ReturnFeeInputs, ReturnFees, compute_return_fees};
pub use types::*;
