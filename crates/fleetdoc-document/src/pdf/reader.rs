// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: validate and inspect generated or archived documents with
// `lopdf`.

use fleetdoc_core::error::{FleetdocError, Result};
use lopdf::{Document, Object};
use serde::Serialize;
use tracing::{debug, instrument};

/// Summary of a PDF byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfInspection {
    pub version: String,
    pub page_count: u32,
    pub byte_size: u64,
    pub title: Option<String>,
    pub producer: Option<String>,
    pub conformance: Option<String>,
}

/// Wraps a loaded `lopdf::Document` for read-only inspection.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Load a PDF already in memory. Bytes without the `%PDF-` signature
    /// are rejected before parsing.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if !data.starts_with(b"%PDF-") {
            return Err(FleetdocError::Render("missing %PDF- header signature".into()));
        }
        let document = Document::load_mem(data)
            .map_err(|err| FleetdocError::Render(format!("failed to load PDF: {err}")))?;
        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    /// A text entry of the document information dictionary.
    pub fn info_text(&self, key: &str) -> Option<String> {
        let info_id = self.document.trailer.get(b"Info").ok()?.as_reference().ok()?;
        let info = self.document.get_dictionary(info_id).ok()?;
        match info.get(key.as_bytes()).ok()? {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            _ => None,
        }
    }

    pub(crate) fn into_document(self) -> Document {
        self.document
    }
}

/// Check the header signature, parse the document and report its page
/// count and metadata.
pub fn inspect_pdf(data: &[u8]) -> Result<PdfInspection> {
    let reader = PdfReader::from_bytes(data)?;
    Ok(PdfInspection {
        version: reader.version().to_owned(),
        page_count: reader.page_count() as u32,
        byte_size: data.len() as u64,
        title: reader.info_text("Title"),
        producer: reader.info_text("Producer"),
        conformance: reader.info_text("Conformance"),
    })
}

/// PDF text strings are PDFDocEncoding or UTF-16BE with a byte-order mark.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Inverse of [`decode_text_string`]: ASCII stays literal, anything else
/// becomes UTF-16BE with a byte-order mark.
pub(crate) fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::string_literal(text)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, lopdf::StringFormat::Hexadecimal)
    }
}
