// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// fleetdoc-document: media and document processing for rental protocols.
//
// Provides the image derivative engine (thumbnail, gallery and document-copy
// renditions of every photo) and the protocol document assembler that lays
// a handover or return protocol out as an archival PDF.

pub mod image;
pub mod pdf;

// Re-export the primary structs so callers can use `fleetdoc_document::DerivativeEngine` etc.
pub use image::{DerivativeEngine, DerivativeKind, ImageDerivativeSet, ImageProcessor};
pub use pdf::{
    DerivativeLookup, PdfReader, ProtocolDocumentAssembler, RenderNotice, RenderNoticeKind,
    RenderedDocument, inspect_pdf,
};
