// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: protocol document assembly, font resolution, page layout,
// archival metadata and read-back inspection.

pub mod assembler;
pub mod fonts;
pub mod layout;
pub mod metadata;
pub mod reader;

pub use assembler::{
    DerivativeLookup, ProtocolDocumentAssembler, RenderNotice, RenderNoticeKind, RenderedDocument,
    protocol_document_key,
};
pub use metadata::{ARCHIVAL_CONFORMANCE, DocumentMetadata, embed_metadata};
pub use reader::{PdfInspection, PdfReader, inspect_pdf};
