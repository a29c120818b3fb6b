// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Archival metadata written into the document information dictionary.

use chrono::{DateTime, Utc};
use fleetdoc_core::error::{FleetdocError, Result};
use fleetdoc_core::types::Protocol;
use lopdf::{Dictionary, Object};
use serde::Serialize;
use tracing::debug;

use super::reader::{PdfReader, encode_text_string};

/// Conformance level the documents declare.
pub const ARCHIVAL_CONFORMANCE: &str = "PDF/A-2b";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
    pub creator: String,
    pub producer: String,
    pub conformance: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentMetadata {
    pub fn for_protocol(protocol: &Protocol, company_name: &str, created_at: DateTime<Utc>) -> Self {
        let common = protocol.common();
        let kind = protocol.kind().as_str();
        Self {
            title: format!("{} protocol {}", capitalise(kind), common.id.short()),
            author: company_name.to_owned(),
            subject: format!(
                "Vehicle {} for order {}",
                kind, common.rental.order_number
            ),
            keywords: vec![
                kind.to_owned(),
                common.rental.vehicle.license_plate.clone(),
                common.rental.order_number.clone(),
            ],
            creator: company_name.to_owned(),
            producer: format!("fleetdoc {}", env!("CARGO_PKG_VERSION")),
            conformance: ARCHIVAL_CONFORMANCE.to_owned(),
            created_at,
        }
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// PDF date string, `D:YYYYMMDDHHmmSSZ`.
fn pdf_date(at: DateTime<Utc>) -> String {
    at.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// Rewrite the information dictionary of `pdf` with `metadata`.
pub fn embed_metadata(pdf: &[u8], metadata: &DocumentMetadata) -> Result<Vec<u8>> {
    let mut document = PdfReader::from_bytes(pdf)?.into_document();

    let mut info = Dictionary::new();
    info.set("Title", encode_text_string(&metadata.title));
    info.set("Author", encode_text_string(&metadata.author));
    info.set("Subject", encode_text_string(&metadata.subject));
    info.set("Keywords", encode_text_string(&metadata.keywords.join(", ")));
    info.set("Creator", encode_text_string(&metadata.creator));
    info.set("Producer", encode_text_string(&metadata.producer));
    info.set("Conformance", encode_text_string(&metadata.conformance));
    let date = pdf_date(metadata.created_at);
    info.set("CreationDate", Object::string_literal(date.clone()));
    info.set("ModDate", Object::string_literal(date));

    let info_id = document.add_object(Object::Dictionary(info));
    document.trailer.set("Info", Object::Reference(info_id));

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|err| FleetdocError::Render(format!("failed to serialise PDF: {err}")))?;
    debug!(bytes = output.len(), "Metadata embedded");
    Ok(output)
}
