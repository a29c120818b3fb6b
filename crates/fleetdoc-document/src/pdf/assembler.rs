// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Protocol document assembler: lays out a handover or return protocol as a
// multi-page PDF with photo grids and signatures, then fingerprints it.

use std::collections::{HashMap, HashSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use fleetdoc_core::config::{DerivativeFormat, DocumentConfig, FeeConfig};
use fleetdoc_core::error::{FleetdocError, Result};
use fleetdoc_core::types::{
    DamageRecord, GeneratedDocument, Protocol, ProtocolCommon, ProtocolImage, ReturnProtocol,
    SignatureImage, SignatureRecord, VehicleConditionSnapshot,
};
use fleetdoc_security::{ManifestEntry, hash_bytes};
use fleetdoc_storage::BlobStore;
use fleetdoc_storage::keys::document_key;
use printpdf::{
    Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::fonts::FontSet;
use super::layout::{LayoutCursor, PageGeometry, chars_per_line, line_height, text_width, wrap_text};
use super::metadata::{DocumentMetadata, embed_metadata};
use super::reader::PdfReader;
use crate::image::{DecodeLimits, DerivativeKind, ImageDerivativeSet, ImageProcessor};

const TITLE_SIZE: f32 = 20.0;
const COMPANY_SIZE: f32 = 12.0;
const HEADING_SIZE: f32 = 13.0;
const SUBHEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 10.0;
const CAPTION_SIZE: f32 = 8.5;
const FOOTER_SIZE: f32 = 8.0;

const LABEL_WIDTH: f32 = 150.0;
const GRID_GAP: f32 = 20.0;
const GRID_PHOTOS_PER_PAGE: usize = 2;
const CAPTION_LINES: usize = 2;
const SIGNATURE_CAPTION_LINES: usize = 2 * CAPTION_LINES;
const SIGNATURE_BOX_HEIGHT: f32 = 70.0;

/// Document-copy derivative bytes, keyed by image id.
#[derive(Debug, Clone, Default)]
pub struct DerivativeLookup {
    images: HashMap<String, Vec<u8>>,
}

impl DerivativeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image_id: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(image_id.into(), bytes);
    }

    /// Register the document copy of a freshly derived photo.
    pub fn insert_set(&mut self, image_id: impl Into<String>, set: &ImageDerivativeSet) {
        self.insert(image_id, set.document_copy.bytes.clone());
    }

    pub fn get(&self, image_id: &str) -> Option<&[u8]> {
        self.images.get(image_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Fetch the stored document copy of every image on `protocol`.
    /// Images without a stored copy are left out and will render as
    /// placeholders.
    pub fn load(store: &dyn BlobStore, protocol: &Protocol, format: DerivativeFormat) -> Self {
        let protocol_id = protocol.id().to_string();
        let mut lookup = Self::new();
        for image in protocol.common().media.all_images() {
            let key = DerivativeKind::DocumentCopy.storage_key(&protocol_id, &image.id, format);
            match store.get(&key) {
                Ok(bytes) => lookup.insert(image.id.clone(), bytes),
                Err(err) => debug!(key, %err, "Document copy not available"),
            }
        }
        lookup
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderNoticeKind {
    MissingImage,
    UndecodableImage,
    SignatureUnavailable,
    FontFallback,
}

/// A degradation that did not stop the render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderNotice {
    pub kind: RenderNoticeKind,
    /// Image or signature id, or the font family.
    pub subject: String,
    pub detail: String,
}

/// A finished, fingerprinted document.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`.
    pub hash: String,
    pub page_count: u32,
    pub byte_size: u64,
    pub notices: Vec<RenderNotice>,
    pub metadata: DocumentMetadata,
}

impl RenderedDocument {
    pub fn manifest_entry(&self, name: impl Into<String>) -> ManifestEntry {
        ManifestEntry::new(name, self.hash.clone(), self.byte_size)
    }

    /// Reference to attach to the protocol once stored under `storage_key`.
    pub fn generated_document(&self, storage_key: impl Into<String>) -> GeneratedDocument {
        GeneratedDocument {
            storage_key: storage_key.into(),
            content_hash: self.hash.clone(),
            byte_size: self.byte_size,
            page_count: self.page_count,
        }
    }
}

/// Storage key for the document generated for `protocol` at `generated_at`.
pub fn protocol_document_key(protocol: &Protocol, generated_at: DateTime<Utc>) -> String {
    document_key(&protocol.id().to_string(), protocol.kind().as_str(), generated_at)
}

/// Renders protocols to archival PDFs. Holds only configuration.
#[derive(Debug, Clone, Default)]
pub struct ProtocolDocumentAssembler {
    config: DocumentConfig,
    fees: FeeConfig,
}

impl ProtocolDocumentAssembler {
    pub fn new(config: DocumentConfig, fees: FeeConfig) -> Self {
        Self { config, fees }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Render `protocol` using the document copies in `lookup`.
    pub fn render(&self, protocol: &Protocol, lookup: &DerivativeLookup) -> Result<RenderedDocument> {
        self.render_at(protocol, lookup, Utc::now())
    }

    /// As [`render`](Self::render) with an explicit generation time.
    #[instrument(skip(self, protocol, lookup), fields(protocol = %protocol.id(), kind = protocol.kind().as_str()))]
    pub fn render_at(
        &self,
        protocol: &Protocol,
        lookup: &DerivativeLookup,
        generated_at: DateTime<Utc>,
    ) -> Result<RenderedDocument> {
        let condition = validate_for_render(protocol)?;

        let metadata = DocumentMetadata::for_protocol(protocol, &self.config.company_name, generated_at);
        let mut doc = PdfDocument::new(&metadata.title);
        let fonts = FontSet::resolve(
            &mut doc,
            &self.config.font_candidates,
            &self.config.bold_font_candidates,
        );

        let geometry = PageGeometry::from_config(&self.config);
        let mut page = PageWriter {
            doc: &mut doc,
            cursor: LayoutCursor::new(geometry),
            fonts,
            lookup,
            dpi: self.config.image_dpi,
            placed: HashMap::new(),
            notices: Vec::new(),
        };
        if page.fonts.is_fallback() {
            page.notices.push(RenderNotice {
                kind: RenderNoticeKind::FontFallback,
                subject: "Helvetica".into(),
                detail: "no font candidate could be embedded; text folded to Latin-1".into(),
            });
        }

        page.header(protocol, &self.config.company_name);
        page.identity(protocol);
        page.rental_summary(protocol.common());
        page.vehicle_condition(protocol, condition, &self.fees);
        page.photo_section("Vehicle photos", &protocol.common().media.vehicle_images);
        page.photo_section("Document photos", &protocol.common().media.document_images);
        page.damages(protocol);
        page.signatures(&protocol.common().signatures);
        page.notes(protocol.common());
        page.footers(protocol, &self.config.company_name, generated_at);

        let PageWriter {
            cursor, notices, ..
        } = page;
        let (page_w, page_h) = cursor.geometry().page_size_mm();
        let pages: Vec<PdfPage> = cursor
            .into_pages()
            .into_iter()
            .map(|ops| PdfPage::new(page_w, page_h, ops))
            .collect();
        let page_count = pages.len() as u32;
        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let raw = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(warnings = warnings.len(), raw_bytes = raw.len(), "PDF serialised");

        let bytes = embed_metadata(&raw, &metadata)?;
        let parsed_pages = PdfReader::from_bytes(&bytes)?.page_count() as u32;
        if parsed_pages != page_count {
            return Err(FleetdocError::Render(format!(
                "serialised document has {parsed_pages} pages, layout emitted {page_count}"
            )));
        }

        let hash = hash_bytes(&bytes);
        let byte_size = bytes.len() as u64;
        info!(
            page_count,
            byte_size,
            notices = notices.len(),
            hash = %hash,
            "Protocol document rendered"
        );

        Ok(RenderedDocument {
            bytes,
            hash,
            page_count,
            byte_size,
            notices,
            metadata,
        })
    }
}

/// Mandatory fields, checked before any page is drawn.
fn validate_for_render(protocol: &Protocol) -> Result<&VehicleConditionSnapshot> {
    let common = protocol.common();
    if common.rental.vehicle.license_plate.trim().is_empty() {
        return Err(FleetdocError::Render("vehicle license plate is missing".into()));
    }
    if common.rental.customer.name.trim().is_empty() {
        return Err(FleetdocError::Render("customer name is missing".into()));
    }
    common
        .vehicle_condition()
        .ok_or_else(|| FleetdocError::Render("vehicle condition snapshot is missing".into()))
}

#[derive(Debug, Clone, Copy)]
struct PlacedImage {
    width: u32,
    height: u32,
}

/// One cell of a photo grid.
struct GridItem {
    image_id: String,
    caption: String,
}

/// Render-scoped state: the document being built, the cursor and the
/// notices collected along the way.
struct PageWriter<'a> {
    doc: &'a mut PdfDocument,
    cursor: LayoutCursor,
    fonts: FontSet,
    lookup: &'a DerivativeLookup,
    dpi: f32,
    placed: HashMap<String, Option<(XObjectId, PlacedImage)>>,
    notices: Vec<RenderNotice>,
}

impl PageWriter<'_> {
    // -- Text primitives ------------------------------------------------------

    fn body(&mut self, text: &str) {
        let text = self.fonts.prepare(text);
        let face = self.fonts.regular.clone();
        self.cursor.paragraph(&face, BODY_SIZE, 0.0, &text);
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading together with at least two lines of content.
        self.cursor.advance(8.0);
        self.cursor
            .ensure_space(line_height(HEADING_SIZE) + 2.0 * line_height(BODY_SIZE));
        let text = self.fonts.prepare(text);
        let face = self.fonts.bold.clone();
        self.cursor.line(&face, HEADING_SIZE, 0.0, text);
        self.cursor.rule();
    }

    fn subheading(&mut self, text: &str) {
        self.cursor.advance(4.0);
        self.cursor
            .ensure_space(line_height(SUBHEADING_SIZE) + line_height(BODY_SIZE));
        let text = self.fonts.prepare(text);
        let face = self.fonts.bold.clone();
        self.cursor.line(&face, SUBHEADING_SIZE, 0.0, text);
    }

    /// `label` in bold on the left, `value` wrapped in the right column.
    fn field(&mut self, label: &str, value: &str) {
        let value_width = self.cursor.geometry().content_width() - LABEL_WIDTH;
        let lines = wrap_text(&self.fonts.prepare(value), chars_per_line(value_width, BODY_SIZE));
        let label = self.fonts.prepare(label);
        let step = line_height(BODY_SIZE);
        let margin = self.cursor.geometry().margin_pt;
        let regular = self.fonts.regular.clone();
        let bold = self.fonts.bold.clone();

        for (index, line) in lines.into_iter().enumerate() {
            self.cursor.ensure_space(step);
            let baseline = self.cursor.y() - BODY_SIZE;
            if index == 0 {
                self.cursor
                    .text_at(&bold, BODY_SIZE, margin, baseline, label.clone());
            }
            self.cursor
                .text_at(&regular, BODY_SIZE, margin + LABEL_WIDTH, baseline, line);
            self.cursor.advance(step);
        }
    }

    // -- Sections -------------------------------------------------------------

    fn header(&mut self, protocol: &Protocol, company_name: &str) {
        let bold = self.fonts.bold.clone();
        let company = self.fonts.prepare(company_name);
        self.cursor.line(&bold, COMPANY_SIZE, 0.0, company);
        let title = match protocol {
            Protocol::Handover(_) => "VEHICLE HANDOVER PROTOCOL",
            Protocol::Return(_) => "VEHICLE RETURN PROTOCOL",
        };
        let title = self.fonts.prepare(title);
        self.cursor.line(&bold, TITLE_SIZE, 0.0, title);
        self.cursor.rule();
    }

    fn identity(&mut self, protocol: &Protocol) {
        let common = protocol.common();
        self.heading("Protocol");
        self.field("Protocol number", &common.id.short());
        self.field("Status", &common.status().to_string());
        self.field("Created", &format_time(common.created_at));
        if let Some(completed) = common.completed_at() {
            self.field("Completed", &format_time(completed));
        }
        self.field("Location", &common.location);
        self.field("Recorded by", &common.created_by);
        if let Protocol::Return(ret) = protocol {
            self.field("Handover protocol", &ret.handover_id.short());
        }
    }

    fn rental_summary(&mut self, common: &ProtocolCommon) {
        let rental = &common.rental;
        self.heading("Rental");
        self.field("Order number", &rental.order_number);
        self.field(
            "Period",
            &format!(
                "{} - {}",
                format_time(rental.start_date),
                format_time(rental.end_date)
            ),
        );
        if let Some(pickup) = &rental.pickup_location {
            self.field("Pickup location", pickup);
        }
        if let Some(drop_off) = &rental.return_location {
            self.field("Return location", drop_off);
        }

        self.subheading("Customer");
        self.field("Name", &rental.customer.name);
        if !rental.customer.email.is_empty() {
            self.field("Email", &rental.customer.email);
        }
        if let Some(phone) = &rental.customer.phone {
            self.field("Phone", phone);
        }

        self.subheading("Vehicle");
        self.field(
            "Vehicle",
            &format!("{} {}", rental.vehicle.brand, rental.vehicle.model),
        );
        self.field("License plate", &rental.vehicle.license_plate);
        if let Some(vin) = &rental.vehicle.vin {
            self.field("VIN", vin);
        }
        if let Some(company) = &rental.vehicle.company {
            self.field("Owner", company);
        }

        self.subheading("Terms");
        self.field("Total price", &money(rental.total_price, &rental.currency));
        self.field("Deposit", &money(rental.deposit, &rental.currency));
        let allowance = match rental.allowed_kilometers {
            Some(km) => format!("{km} km"),
            None => "unlimited".into(),
        };
        self.field("Allowed kilometres", &allowance);
        if let Some(rate) = rental.extra_kilometer_rate {
            self.field(
                "Extra kilometre rate",
                &format!("{} / km", money(rate, &rental.currency)),
            );
        }
    }

    fn vehicle_condition(
        &mut self,
        protocol: &Protocol,
        condition: &VehicleConditionSnapshot,
        fees: &FeeConfig,
    ) {
        self.heading("Vehicle condition");
        if let Protocol::Return(ret) = protocol {
            self.field(
                "Odometer",
                &format!(
                    "{} km (handover {} km)",
                    condition.odometer, ret.handover_condition.odometer
                ),
            );
            self.field(
                "Fuel level",
                &format!(
                    "{} % (handover {} %)",
                    condition.fuel_level, ret.handover_condition.fuel_level
                ),
            );
        } else {
            self.field("Odometer", &format!("{} km", condition.odometer));
            self.field("Fuel level", &format!("{} %", condition.fuel_level));
        }
        self.field("Fuel type", fuel_label(condition));
        self.field("Exterior", &condition.exterior_condition);
        self.field("Interior", &condition.interior_condition);
        if let Some(notes) = &condition.notes {
            self.field("Remarks", notes);
        }

        if let Protocol::Return(ret) = protocol {
            self.settlement(ret, fees);
        }
    }

    fn settlement(&mut self, ret: &ReturnProtocol, fees: &FeeConfig) {
        let Some(figures) = ret.fees(fees) else {
            return;
        };
        let currency = ret.common.rental.currency.clone();
        self.subheading("Settlement");
        let mut driven = format!("{} km", figures.kilometers_used);
        if figures.odometer_anomaly {
            driven.push_str(" (odometer reading decreased)");
        }
        self.field("Kilometres driven", &driven);
        self.field(
            "Kilometre overage",
            &format!(
                "{} km = {}",
                figures.kilometer_overage,
                money(figures.kilometer_fee, &currency)
            ),
        );
        self.field(
            "Fuel shortfall",
            &format!(
                "{} % = {}",
                figures.fuel_used,
                money(figures.fuel_fee, &currency)
            ),
        );
        if figures.additional_charges > Decimal::ZERO {
            self.field(
                "Additional charges",
                &money(figures.additional_charges, &currency),
            );
        }
        self.field("Total extra fees", &money(figures.total_extra_fees, &currency));
        self.field("Deposit", &money(figures.deposit, &currency));
        self.field("Calculated refund", &money(figures.computed_refund, &currency));
        if let Some(refund) = figures.refund_override {
            self.field("Refund (adjusted)", &money(refund, &currency));
        }
        self.field("Refund paid", &money(figures.final_refund, &currency));
        if figures.amount_due > Decimal::ZERO {
            self.field("Amount due", &money(figures.amount_due, &currency));
        }
    }

    fn photo_section(&mut self, title: &str, images: &[ProtocolImage]) {
        if images.is_empty() {
            return;
        }
        self.heading(title);
        let items: Vec<GridItem> = images
            .iter()
            .enumerate()
            .map(|(index, image)| GridItem {
                image_id: image.id.clone(),
                caption: caption_for(image, index),
            })
            .collect();
        self.photo_grid(&items);
    }

    fn damages(&mut self, protocol: &Protocol) {
        self.heading("Damages");
        match protocol {
            Protocol::Handover(handover) => {
                let common = &handover.common;
                if common.damages.is_empty() {
                    self.body("No damages recorded.");
                }
                for (index, damage) in common.damages.iter().enumerate() {
                    self.damage(common, index, damage);
                }
            }
            Protocol::Return(ret) => {
                self.subheading("Recorded at handover");
                if ret.common.damages.is_empty() {
                    self.body("None.");
                }
                for (index, damage) in ret.common.damages.iter().enumerate() {
                    self.damage(&ret.common, index, damage);
                }
                self.subheading("New at return");
                if ret.new_damages.is_empty() {
                    self.body("None.");
                }
                for (index, damage) in ret.new_damages.iter().enumerate() {
                    self.damage(&ret.common, index, damage);
                }
            }
        }

        let linked: HashSet<&str> = protocol
            .all_damages()
            .into_iter()
            .flat_map(|damage| damage.image_ids.iter().map(String::as_str))
            .collect();
        let unlinked: Vec<ProtocolImage> = protocol
            .common()
            .media
            .damage_images
            .iter()
            .filter(|image| !linked.contains(image.id.as_str()))
            .cloned()
            .collect();
        self.photo_section("Damage photos", &unlinked);
    }

    fn damage(&mut self, common: &ProtocolCommon, index: usize, damage: &DamageRecord) {
        let bold = self.fonts.bold.clone();
        let line = self.fonts.prepare(&format!(
            "{}. {} ({})",
            index + 1,
            damage.location,
            damage.severity.as_str()
        ));
        self.cursor.advance(2.0);
        self.cursor.line(&bold, BODY_SIZE, 0.0, line);
        self.body(&damage.description);
        self.body(&format!("Recorded {}", format_time(damage.captured_at)));

        let items: Vec<GridItem> = damage
            .image_ids
            .iter()
            .enumerate()
            .map(|(photo_index, id)| {
                let known = common.media.all_images().find(|image| &image.id == id);
                GridItem {
                    image_id: id.clone(),
                    caption: match known {
                        Some(image) => caption_for(image, photo_index),
                        None => format!("Damage photo {}", photo_index + 1),
                    },
                }
            })
            .collect();
        if !items.is_empty() {
            self.photo_grid(&items);
        }
    }

    fn signatures(&mut self, signatures: &[SignatureRecord]) {
        self.heading("Signatures");
        if signatures.is_empty() {
            self.body("Not signed.");
            return;
        }

        let geometry = *self.cursor.geometry();
        let column_width = (geometry.content_width() - GRID_GAP) / 2.0;
        let caption_step = line_height(CAPTION_SIZE);
        let caption_chars = chars_per_line(column_width, CAPTION_SIZE);
        let row_height =
            SIGNATURE_BOX_HEIGHT + 6.0 + SIGNATURE_CAPTION_LINES as f32 * caption_step + 12.0;

        for row in signatures.chunks(2) {
            self.cursor.ensure_space(row_height);
            let top = self.cursor.y();
            for (column, signature) in row.iter().enumerate() {
                let x = geometry.margin_pt + column as f32 * (column_width + GRID_GAP);
                self.signature(signature, x, top, column_width);

                let regular = self.fonts.regular.clone();
                let signer = self.fonts.prepare(&format!(
                    "{} ({})",
                    signature.signer_name,
                    signature.signer_role.as_str()
                ));
                let place = self.fonts.prepare(&format!(
                    "{} \u{B7} {}",
                    format_time(signature.signed_at),
                    signature.location
                ));
                let mut baseline = top - SIGNATURE_BOX_HEIGHT - 6.0 - CAPTION_SIZE;
                for line in signature_caption(&signer, &place, caption_chars) {
                    self.cursor.text_at(&regular, CAPTION_SIZE, x, baseline, line);
                    baseline -= caption_step;
                }
            }
            self.cursor.advance(row_height);
        }
    }

    fn signature(&mut self, signature: &SignatureRecord, x: f32, top: f32, width: f32) {
        let key = format!("signature:{}", signature.id);
        let placed = match self.placed.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let decoded = signature_bytes(&signature.image)
                    .and_then(|bytes| self.embed(&bytes));
                let placed = match decoded {
                    Ok(placed) => Some(placed),
                    Err(err) => {
                        warn!(signature = %signature.id, %err, "Signature image unavailable");
                        self.notices.push(RenderNotice {
                            kind: RenderNoticeKind::SignatureUnavailable,
                            subject: signature.id.clone(),
                            detail: err.to_string(),
                        });
                        None
                    }
                };
                self.placed.insert(key, placed.clone());
                placed
            }
        };

        match placed {
            Some((id, image)) => self.cursor.image(
                id,
                image.width,
                image.height,
                self.dpi,
                x,
                top,
                width,
                SIGNATURE_BOX_HEIGHT,
            ),
            None => {
                let regular = self.fonts.regular.clone();
                let label = self.fonts.prepare("signature unavailable");
                self.cursor.frame(x, top, width, SIGNATURE_BOX_HEIGHT);
                self.cursor.text_at(
                    &regular,
                    BODY_SIZE,
                    x + 8.0,
                    top - SIGNATURE_BOX_HEIGHT / 2.0 - BODY_SIZE / 2.0,
                    label,
                );
            }
        }
    }

    fn notes(&mut self, common: &ProtocolCommon) {
        let Some(notes) = common.notes.as_deref().filter(|n| !n.trim().is_empty()) else {
            return;
        };
        self.heading("Notes");
        self.body(notes);
    }

    fn footers(&mut self, protocol: &Protocol, company_name: &str, generated_at: DateTime<Utc>) {
        let geometry = *self.cursor.geometry();
        let total = self.cursor.page_count();
        let regular = self.fonts.regular.clone();
        let stamp = self.fonts.prepare(&format!(
            "{company_name} \u{B7} {} protocol {} \u{B7} generated {}",
            protocol.kind().as_str(),
            protocol.id().short(),
            format_time(generated_at)
        ));
        let baseline = geometry.margin_pt;

        for page in 0..total {
            let number = format!("Page {} / {}", page + 1, total);
            let number_x =
                geometry.width_pt - geometry.margin_pt - text_width(&number, FOOTER_SIZE);
            let mut ops = Vec::new();
            for (x, text) in [(geometry.margin_pt, stamp.clone()), (number_x, number)] {
                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(x),
                        y: Pt(baseline),
                    },
                });
                ops.extend(regular.text_ops(FOOTER_SIZE, text));
                ops.push(Op::EndTextSection);
            }
            self.cursor.push_to_page(page, ops);
        }
    }

    // -- Images ---------------------------------------------------------------

    /// Two images per row and one row per page: every row after the first
    /// opens a new page, the first one only when it does not fit.
    fn photo_grid(&mut self, items: &[GridItem]) {
        let geometry = *self.cursor.geometry();
        let column_width = (geometry.content_width() - GRID_GAP) / 2.0;
        let image_height = column_width;
        let caption_step = line_height(CAPTION_SIZE);
        let row_height = image_height + 6.0 + CAPTION_LINES as f32 * caption_step + 12.0;
        let caption_chars = chars_per_line(column_width, CAPTION_SIZE);

        for (row_index, row) in items.chunks(GRID_PHOTOS_PER_PAGE).enumerate() {
            if row_index > 0 {
                self.cursor.new_page();
            } else {
                self.cursor.ensure_space(row_height);
            }
            let top = self.cursor.y();
            for (column, item) in row.iter().enumerate() {
                let x = geometry.margin_pt + column as f32 * (column_width + GRID_GAP);
                self.grid_image(&item.image_id, x, top, column_width, image_height);

                let regular = self.fonts.regular.clone();
                let caption = self.fonts.prepare(&item.caption);
                let mut baseline = top - image_height - 6.0 - CAPTION_SIZE;
                for line in wrap_text(&caption, caption_chars).into_iter().take(CAPTION_LINES) {
                    self.cursor.text_at(&regular, CAPTION_SIZE, x, baseline, line);
                    baseline -= caption_step;
                }
            }
            self.cursor.advance(row_height);
        }
    }

    fn grid_image(&mut self, image_id: &str, x: f32, top: f32, width: f32, height: f32) {
        let placed = match self.placed.get(image_id) {
            Some(cached) => cached.clone(),
            None => {
                let placed = self.embed_derivative(image_id);
                self.placed.insert(image_id.to_owned(), placed.clone());
                placed
            }
        };

        match placed {
            Some((id, image)) => {
                self.cursor
                    .image(id, image.width, image.height, self.dpi, x, top, width, height)
            }
            None => {
                let regular = self.fonts.regular.clone();
                let label = self.fonts.prepare("Image unavailable");
                self.cursor.frame(x, top, width, height);
                self.cursor.text_at(
                    &regular,
                    BODY_SIZE,
                    x + 8.0,
                    top - height / 2.0,
                    label,
                );
            }
        }
    }

    fn embed_derivative(&mut self, image_id: &str) -> Option<(XObjectId, PlacedImage)> {
        let lookup = self.lookup;
        let Some(bytes) = lookup.get(image_id) else {
            warn!(image = image_id, "Document copy missing, drawing placeholder");
            self.notices.push(RenderNotice {
                kind: RenderNoticeKind::MissingImage,
                subject: image_id.to_owned(),
                detail: "no document copy supplied".into(),
            });
            return None;
        };
        match self.embed(bytes) {
            Ok(placed) => Some(placed),
            Err(err) => {
                warn!(image = image_id, %err, "Document copy undecodable, drawing placeholder");
                self.notices.push(RenderNotice {
                    kind: RenderNoticeKind::UndecodableImage,
                    subject: image_id.to_owned(),
                    detail: err.to_string(),
                });
                None
            }
        }
    }

    fn embed(&mut self, bytes: &[u8]) -> Result<(XObjectId, PlacedImage)> {
        let processor = ImageProcessor::decode(bytes, DecodeLimits::default())?;
        let rgb = processor.to_rgb8_flattened();
        let placed = PlacedImage {
            width: rgb.width(),
            height: rgb.height(),
        };
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: placed.width as usize,
            height: placed.height as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        Ok((self.doc.add_image(&raw), placed))
    }
}

/// Encoded image bytes of a signature.
fn signature_bytes(image: &SignatureImage) -> Result<Vec<u8>> {
    match image {
        SignatureImage::Bytes(bytes) => Ok(bytes.clone()),
        SignatureImage::DataUrl(url) => {
            let payload = url
                .strip_prefix("data:")
                .and_then(|rest| rest.split_once(";base64,"))
                .map(|(_, payload)| payload)
                .ok_or_else(|| FleetdocError::UnsupportedMedia("signature is not a base64 data URL".into()))?;
            STANDARD
                .decode(payload.trim())
                .map_err(|err| FleetdocError::UnsupportedMedia(format!("signature payload: {err}")))
        }
    }
}

/// Signer and place lines of a signature, each wrapped to the column and
/// kept to two lines.
fn signature_caption(signer: &str, place: &str, max_chars: usize) -> Vec<String> {
    wrap_text(signer, max_chars)
        .into_iter()
        .take(CAPTION_LINES)
        .chain(wrap_text(place, max_chars).into_iter().take(CAPTION_LINES))
        .collect()
}

fn caption_for(image: &ProtocolImage, index: usize) -> String {
    let label = image
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Photo {}", index + 1));
    format!("{label} \u{B7} {}", format_time(image.captured_at))
}

fn fuel_label(condition: &VehicleConditionSnapshot) -> &'static str {
    use fleetdoc_core::types::FuelType;
    match condition.fuel_type {
        FuelType::Gasoline => "gasoline",
        FuelType::Diesel => "diesel",
        FuelType::Electric => "electric",
        FuelType::Hybrid => "hybrid",
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M UTC").to_string()
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}
