// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: bounded decoding and multi-resolution photo derivatives.

pub mod derivatives;
pub mod processor;

pub use derivatives::{Derivative, DerivativeEngine, DerivativeKind, DerivativeSizes, ImageDerivativeSet};
pub use processor::{DecodeLimits, ImageProcessor};
