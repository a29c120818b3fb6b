// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Fleetdoc storage capability.
//!
//! The pipeline only ever needs "get bytes by key" and "put bytes at key".
//! [`BlobStore`] captures that; the caller picks a backend and hands it to
//! whichever component needs it.

pub mod keys;
pub mod local;
pub mod memory;
pub mod traits;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use traits::BlobStore;
