// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Legacy Migration Service: validates first-generation records, re-derives
// their photos, rebuilds the protocol, regenerates its document and keeps
// progress counters for batch runs.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fleetdoc_core::config::{FeeConfig, FleetdocConfig, MigrationConfig};
use fleetdoc_core::error::{FleetdocError, Result};
use fleetdoc_core::types::{
    HandoverProtocol, ImagePurpose, Protocol, ProtocolCommon, ProtocolId, ProtocolImage,
    ProtocolKind, ReturnProtocol,
};
use fleetdoc_document::image::DerivativeEngine;
use fleetdoc_document::pdf::{DerivativeLookup, ProtocolDocumentAssembler, protocol_document_key};
use fleetdoc_security::{DocumentManifest, ManifestEntry, build_manifest, hash_bytes};
use fleetdoc_storage::BlobStore;
use fleetdoc_storage::keys::{migrated_document_key, protocol_record_key};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::legacy::{LegacyPayload, LegacyPhoto, LegacyProtocolRecord, legacy_storage_key};
use crate::progress::MigrationProgress;

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Validate and count records without writing anything.
    pub dry_run: bool,
    /// Keep photo references but do not fetch or re-derive them. The
    /// document then uses whatever document copies are already stored.
    pub skip_photos: bool,
    /// Neither render a new document nor carry over the legacy PDF.
    pub skip_documents: bool,
}

/// Result of migrating one record.
#[derive(Debug, Clone)]
pub struct MigratedProtocol {
    pub protocol: Protocol,
    /// Every artifact written for this protocol.
    pub manifest: DocumentManifest,
    /// Where the first-generation PDF was preserved, if there was one.
    pub legacy_document_key: Option<String>,
    /// Local degradations (missing photos, placeholders, status kept as
    /// draft) that did not fail the record.
    pub warnings: Vec<String>,
}

struct PhotoSource {
    photo: LegacyPhoto,
    purpose: ImagePurpose,
}

/// Migrates records against one store: sources are read from it and every
/// derivative, document and protocol record is written back to it.
pub struct MigrationService<S: BlobStore> {
    store: S,
    engine: DerivativeEngine,
    assembler: ProtocolDocumentAssembler,
    fees: FeeConfig,
    config: MigrationConfig,
    progress: MigrationProgress,
}

impl<S: BlobStore> MigrationService<S> {
    pub fn new(store: S, config: &FleetdocConfig) -> Self {
        Self {
            store,
            engine: DerivativeEngine::new(config.derivatives.clone()),
            assembler: ProtocolDocumentAssembler::new(config.document.clone(), config.fees.clone()),
            fees: config.fees.clone(),
            config: config.migration.clone(),
            progress: MigrationProgress::new(0, Utc::now()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the counters of the current or last batch.
    pub fn progress(&self) -> MigrationProgress {
        self.progress.clone()
    }

    /// Migrate one record with default options.
    pub fn migrate(&self, record: &LegacyProtocolRecord) -> Result<MigratedProtocol> {
        self.migrate_with(record, &MigrationOptions::default())
    }

    #[instrument(skip(self, record), fields(record = record.display_id()))]
    pub fn migrate_with(
        &self,
        record: &LegacyProtocolRecord,
        options: &MigrationOptions,
    ) -> Result<MigratedProtocol> {
        record.validate()?;
        let payload = record.payload()?;
        let protocol_id = record.display_id().to_owned();
        let created_at = record.created_at.unwrap_or_else(Utc::now);
        let mut warnings = Vec::new();
        let mut entries: Vec<ManifestEntry> = Vec::new();
        let mut lookup = DerivativeLookup::new();

        let sources = collect_photos(record, &payload);
        let images: Vec<ProtocolImage> = if options.skip_photos || options.dry_run {
            sources.iter().map(|source| reference(source, created_at, None)).collect()
        } else {
            self.migrate_photos(&protocol_id, &sources, created_at, &mut lookup, &mut entries, &mut warnings)
        };

        let mut protocol = build_protocol(record, &payload, images, &self.fees, &mut warnings)?;
        if options.dry_run {
            let manifest = build_manifest(entries)?;
            return Ok(MigratedProtocol {
                protocol,
                manifest,
                legacy_document_key: None,
                warnings,
            });
        }

        let mut legacy_document_key = None;
        if !options.skip_documents {
            if options.skip_photos {
                lookup = DerivativeLookup::load(
                    &self.store,
                    &protocol,
                    self.engine.config().document.format,
                );
            }
            let generated_at = Utc::now();
            let rendered = self.assembler.render_at(&protocol, &lookup, generated_at)?;
            for notice in &rendered.notices {
                warnings.push(format!("{:?} {}: {}", notice.kind, notice.subject, notice.detail));
            }
            let key = protocol_document_key(&protocol, generated_at);
            self.store.put(&key, &rendered.bytes, "application/pdf")?;
            entries.push(rendered.manifest_entry(key.clone()));
            protocol.attach_document(rendered.generated_document(key));

            if let Some(url) = record.pdf_url.as_deref().filter(|url| !url.trim().is_empty()) {
                match self.carry_over_pdf(&protocol_id, url) {
                    Ok(entry) => {
                        legacy_document_key = Some(entry.name.clone());
                        entries.push(entry);
                    }
                    Err(err) => {
                        warn!(url, %err, "Legacy PDF not carried over");
                        warnings.push(format!("legacy PDF {url}: {err}"));
                    }
                }
            }
        }

        let record_json = serde_json::to_vec_pretty(&protocol)?;
        self.store
            .put(&protocol_record_key(&protocol_id), &record_json, "application/json")?;

        let manifest = build_manifest(entries)?;
        info!(
            protocol = %protocol.id(),
            kind = protocol.kind().as_str(),
            artifacts = manifest.len(),
            warnings = warnings.len(),
            "Legacy protocol migrated"
        );
        Ok(MigratedProtocol {
            protocol,
            manifest,
            legacy_document_key,
            warnings,
        })
    }

    /// Migrate `records` one after another. A failing record is counted
    /// and reported; it never stops the batch.
    pub fn migrate_batch(
        &mut self,
        records: &[LegacyProtocolRecord],
        options: &MigrationOptions,
    ) -> MigrationProgress {
        let started = Instant::now();
        self.progress = MigrationProgress::new(records.len(), Utc::now());
        info!(
            total = records.len(),
            dry_run = options.dry_run,
            skip_photos = options.skip_photos,
            skip_documents = options.skip_documents,
            "Starting legacy migration"
        );

        for record in records {
            match self.migrate_with(record, options) {
                Ok(_) => self.progress.record_success(),
                Err(err) => {
                    warn!(record = record.display_id(), %err, "Record not migrated");
                    self.progress.record_failure(
                        record.display_id(),
                        err.to_string(),
                        Utc::now(),
                        self.config.max_error_entries,
                    );
                }
            }
            self.progress.update_estimate(started.elapsed(), Utc::now());
            debug!(
                processed = self.progress.processed,
                total = self.progress.total,
                "Migration progress"
            );
        }

        info!(
            total = self.progress.total,
            successful = self.progress.successful,
            failed = self.progress.failed,
            success_rate = self.progress.success_rate(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Legacy migration finished"
        );
        self.progress.clone()
    }

    /// Fetch, derive and store every photo. Failed photos stay referenced
    /// so the document shows a placeholder for them.
    fn migrate_photos(
        &self,
        protocol_id: &str,
        sources: &[PhotoSource],
        created_at: DateTime<Utc>,
        lookup: &mut DerivativeLookup,
        entries: &mut Vec<ManifestEntry>,
        warnings: &mut Vec<String>,
    ) -> Vec<ProtocolImage> {
        let bucket = self.config.source_bucket.as_deref();
        let fetched: Vec<Option<Vec<u8>>> = sources
            .iter()
            .map(|source| {
                let key = legacy_storage_key(&source.photo.url, bucket);
                match self.store.get(&key) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        warn!(photo = source.photo.id(), key, %err, "Legacy photo not found");
                        warnings.push(format!("photo {}: {err}", source.photo.id()));
                        None
                    }
                }
            })
            .collect();

        let available: Vec<&[u8]> = fetched.iter().flatten().map(Vec::as_slice).collect();
        let mut derived = self.engine.process_batch(&available).into_iter();

        let mut images = Vec::with_capacity(sources.len());
        for (source, bytes) in sources.iter().zip(&fetched) {
            let photo_id = source.photo.id();
            let content_hash = match bytes.as_ref().and_then(|_| derived.next()) {
                Some(Ok(set)) => match set.store(&self.store, protocol_id, photo_id) {
                    Ok(_) => {
                        entries.extend(set.manifest_entries(protocol_id, photo_id));
                        lookup.insert_set(photo_id, &set);
                        Some(set.content_hash)
                    }
                    Err(err) => {
                        warnings.push(format!("photo {photo_id}: {err}"));
                        None
                    }
                },
                Some(Err(err)) => {
                    warn!(photo = photo_id, %err, "Legacy photo could not be derived");
                    warnings.push(format!("photo {photo_id}: {err}"));
                    None
                }
                None => None,
            };
            images.push(reference(source, created_at, content_hash));
        }
        images
    }

    /// Re-check a migration against the store: the protocol record must
    /// be readable and carry the same photos, and every artifact in the
    /// manifest must still hash to its recorded value.
    #[instrument(skip(self, migrated), fields(protocol = %migrated.protocol.id()))]
    pub fn validate_migration(&self, migrated: &MigratedProtocol) -> Result<()> {
        let protocol_id = migrated.protocol.id().to_string();
        let stored_json = self.store.get(&protocol_record_key(&protocol_id))?;
        let stored: Protocol = serde_json::from_slice(&stored_json)?;
        if stored.id() != migrated.protocol.id() {
            return Err(FleetdocError::Validation(format!(
                "stored record {} does not belong to protocol {protocol_id}",
                stored.id()
            )));
        }

        let expected = migrated.protocol.common().media.all_images().count();
        let found = stored.common().media.all_images().count();
        if expected != found {
            return Err(FleetdocError::Validation(format!(
                "protocol {protocol_id}: expected {expected} photos, stored record has {found}"
            )));
        }

        for entry in migrated.manifest.entries() {
            let bytes = self.store.get(&entry.name)?;
            migrated.manifest.verify_entry(&entry.name, &bytes)?;
        }
        debug!(artifacts = migrated.manifest.len(), photos = found, "Migration verified");
        Ok(())
    }

    /// Remove every artifact a migration wrote, including the protocol
    /// record. Legacy sources are never touched. Returns the number of
    /// objects removed.
    #[instrument(skip(self, migrated), fields(protocol = %migrated.protocol.id()))]
    pub fn rollback(&self, migrated: &MigratedProtocol) -> Result<usize> {
        let record_key = protocol_record_key(&migrated.protocol.id().to_string());
        let mut removed = 0;
        for key in migrated
            .manifest
            .entries()
            .iter()
            .map(|entry| entry.name.as_str())
            .chain(std::iter::once(record_key.as_str()))
        {
            if self.store.delete(key)? {
                removed += 1;
            }
        }
        info!(removed, "Migration rolled back");
        Ok(removed)
    }

    fn carry_over_pdf(&self, protocol_id: &str, url: &str) -> Result<ManifestEntry> {
        let key = legacy_storage_key(url, self.config.source_bucket.as_deref());
        let bytes = self.store.get(&key)?;
        let hash = hash_bytes(&bytes);
        let target = migrated_document_key(protocol_id, &hash);
        self.store.put(&target, &bytes, "application/pdf")?;
        debug!(from = key, to = target, "Legacy PDF preserved");
        Ok(ManifestEntry::new(target, hash, bytes.len() as u64))
    }
}

/// Photos from the payload image lists, the damages and the record's photo
/// rows, first occurrence of each id wins.
fn collect_photos(record: &LegacyProtocolRecord, payload: &LegacyPayload) -> Vec<PhotoSource> {
    let damage_photos = payload
        .damages
        .iter()
        .chain(payload.new_damages.iter())
        .flat_map(|damage| damage.images.iter());
    let candidates = payload
        .vehicle_images
        .iter()
        .map(|photo| (photo, ImagePurpose::Vehicle))
        .chain(payload.document_images.iter().map(|photo| (photo, ImagePurpose::Document)))
        .chain(payload.damage_images.iter().map(|photo| (photo, ImagePurpose::Damage)))
        .chain(damage_photos.map(|photo| (photo, ImagePurpose::Damage)))
        .chain(record.photos().iter().map(|photo| (photo, ImagePurpose::Vehicle)));

    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for (reference, fallback) in candidates {
        let photo = reference.resolve();
        if seen.insert(photo.id().to_owned()) {
            let purpose = photo.purpose(fallback);
            sources.push(PhotoSource { photo, purpose });
        }
    }
    sources
}

fn reference(source: &PhotoSource, created_at: DateTime<Utc>, content_hash: Option<String>) -> ProtocolImage {
    ProtocolImage {
        id: source.photo.id().to_owned(),
        purpose: source.purpose,
        description: source.photo.description.clone(),
        captured_at: source.photo.captured_at.unwrap_or(created_at),
        content_hash,
    }
}

/// Rebuild the current protocol shape from a validated record.
fn build_protocol(
    record: &LegacyProtocolRecord,
    payload: &LegacyPayload,
    images: Vec<ProtocolImage>,
    fees: &FeeConfig,
    warnings: &mut Vec<String>,
) -> Result<Protocol> {
    let missing = |field: &str| FleetdocError::Validation(format!("legacy record lacks {field}"));
    let created_at = record.created_at.ok_or_else(|| missing("created_at"))?;
    let rental = payload
        .rental_data
        .as_ref()
        .ok_or_else(|| missing("data.rentalData"))?
        .to_summary(created_at);
    let condition = payload
        .vehicle_condition
        .as_ref()
        .ok_or_else(|| missing("data.vehicleCondition"))?
        .to_snapshot();

    let record_id = record.display_id().to_owned();
    let mut common = ProtocolCommon::new(
        record.rental_id.clone().unwrap_or_else(|| record_id.clone()),
        rental,
        payload.location.clone().unwrap_or_default(),
        payload.created_by.clone().unwrap_or_else(|| "migration".into()),
    );
    common.id = ProtocolId(record_id);
    common.created_at = created_at;
    common.notes = payload.notes.clone().filter(|n| !n.trim().is_empty());
    common.set_vehicle_condition(condition)?;
    for image in images {
        common.media.push(image);
    }
    common.signatures = payload
        .signatures
        .iter()
        .enumerate()
        .map(|(index, signature)| signature.to_record(index, created_at))
        .collect();

    let is_return = record.kind() == Some(ProtocolKind::Return);
    common.damages = payload
        .damages
        .iter()
        .enumerate()
        .map(|(index, damage)| {
            let photos: Vec<LegacyPhoto> = damage.images.iter().map(|p| p.resolve()).collect();
            damage.to_record(index, &photos, created_at, is_return)
        })
        .collect();

    let mut protocol = if is_return {
        let handover_condition = payload
            .handover_protocol
            .as_ref()
            .and_then(|handover| handover.vehicle_condition.as_ref())
            .ok_or_else(|| missing("data.handoverProtocol.vehicleCondition"))?
            .to_snapshot();
        let handover_id = payload
            .handover_id()
            .ok_or_else(|| missing("data.handoverProtocolId"))?;
        let offset = common.damages.len();
        let new_damages = payload
            .new_damages
            .iter()
            .enumerate()
            .map(|(index, damage)| {
                let photos: Vec<LegacyPhoto> = damage.images.iter().map(|p| p.resolve()).collect();
                damage.to_record(offset + index, &photos, created_at, false)
            })
            .collect();
        let mut ret = ReturnProtocol {
            common,
            handover_id: ProtocolId(handover_id.to_owned()),
            handover_condition,
            new_damages,
            additional_charges: payload.additional_charges.unwrap_or(Decimal::ZERO),
            refund_override: None,
        };
        // Keep the refund that was actually paid when it differs from the
        // recomputed one.
        if let (Some(paid), Some(computed)) = (payload.final_refund, ret.fees(fees)) {
            if paid.round_dp(2) != computed.final_refund {
                ret.refund_override = Some(paid);
            }
        }
        Protocol::Return(ret)
    } else {
        Protocol::Handover(HandoverProtocol::new(common))
    };

    apply_status(&mut protocol, payload, created_at, warnings);
    Ok(protocol)
}

fn apply_status(
    protocol: &mut Protocol,
    payload: &LegacyPayload,
    created_at: DateTime<Utc>,
    warnings: &mut Vec<String>,
) {
    let status = payload.status.as_deref().map(str::to_ascii_lowercase);
    let outcome = match status.as_deref() {
        Some("completed") => protocol.complete(payload.completed_at.unwrap_or(created_at)),
        Some("cancelled") => protocol.cancel(),
        _ => Ok(()),
    };
    if let Err(err) = outcome {
        warn!(protocol = %protocol.id(), %err, "Legacy status not applied, kept as draft");
        warnings.push(format!("status: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use fleetdoc_core::types::ProtocolStatus;
    use fleetdoc_document::ImageProcessor;
    use fleetdoc_storage::MemoryStore;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;

    fn jpeg() -> Vec<u8> {
        let img = RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 60]));
        ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(img))
            .to_jpeg_bytes(85)
            .unwrap()
    }

    fn signature_url() -> String {
        let img = RgbImage::from_pixel(40, 16, Rgb([0, 0, 0]));
        let png = ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(img))
            .to_png_bytes()
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(png))
    }

    fn handover_record(id: &str) -> LegacyProtocolRecord {
        serde_json::from_value(json!({
            "id": id,
            "protocol_type": "handover",
            "vehicle_id": "v-1",
            "customer_id": "c-1",
            "rental_id": "r-1",
            "created_at": "2024-05-01T08:00:00Z",
            "photos": [
                { "id": "ph-1", "url": "https://cdn.example.com/old/legacy/ph-1.jpg", "category": "vehicle" },
                { "id": "ph-2", "url": "https://cdn.example.com/old/legacy/ph-2.jpg", "category": "vehicle" }
            ],
            "pdf_url": "https://cdn.example.com/old/legacy/protocol.pdf",
            "data": {
                "location": "Bratislava",
                "createdBy": "employee-7",
                "status": "completed",
                "vehicleCondition": { "odometer": 50000, "fuelLevel": 100, "fuelType": "diesel",
                                      "exteriorCondition": "OK", "interiorCondition": "OK" },
                "rentalData": {
                    "orderNumber": "OBJ-1",
                    "vehicle": { "licensePlate": "BA-123XY", "brand": "Škoda", "model": "Octavia" },
                    "customer": { "name": "Ján Kováč", "email": "jan@example.sk" },
                    "deposit": 500, "currency": "EUR", "allowedKilometers": 200, "extraKilometerRate": 0.2
                },
                "signatures": [
                    { "id": "s-1", "signature": signature_url(), "signerName": "Ján Kováč",
                      "signerRole": "customer", "location": "Bratislava" }
                ]
            }
        }))
        .unwrap()
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.put("legacy/ph-1.jpg", &jpeg(), "image/jpeg").unwrap();
        store.put("legacy/ph-2.jpg", &jpeg(), "image/jpeg").unwrap();
        store.put("legacy/protocol.pdf", b"%PDF-1.4 legacy", "application/pdf").unwrap();
        store
    }

    fn config() -> FleetdocConfig {
        let mut config = FleetdocConfig::default();
        config.migration.source_bucket = Some("old".into());
        config
    }

    #[test]
    fn migrates_photos_document_and_legacy_pdf() {
        let service = MigrationService::new(seeded_store(), &config());
        let migrated = service.migrate(&handover_record("p-1")).unwrap();

        let protocol = &migrated.protocol;
        assert_eq!(protocol.id().to_string(), "p-1");
        assert_eq!(protocol.common().status(), ProtocolStatus::Completed);
        assert_eq!(protocol.common().media.vehicle_images.len(), 2);
        assert!(
            protocol
                .common()
                .media
                .vehicle_images
                .iter()
                .all(|image| image.content_hash.is_some())
        );

        let document = protocol.common().document.clone().unwrap();
        let stored = service.store().get(&document.storage_key).unwrap();
        assert!(fleetdoc_security::verify(&stored, &document.content_hash));
        migrated.manifest.verify_entry(&document.storage_key, &stored).unwrap();

        // Two photos with three renditions each, the new PDF and the old one.
        assert_eq!(migrated.manifest.len(), 8);
        let legacy_key = migrated.legacy_document_key.unwrap();
        assert!(legacy_key.starts_with("protocols/p-1/pdf/migrated_"));
        assert_eq!(service.store().get(&legacy_key).unwrap(), b"%PDF-1.4 legacy");
        assert!(service.store().exists("protocols/p-1/protocol.json").unwrap());
    }

    #[test]
    fn missing_photo_degrades_to_placeholder() {
        let store = seeded_store();
        let service = MigrationService::new(store, &config());
        let mut record = handover_record("p-2");
        record.photos = Some(vec![crate::legacy::LegacyPhotoRef::Url(
            "https://cdn.example.com/old/legacy/gone.jpg".into(),
        )]);

        let migrated = service.migrate(&record).unwrap();
        let images = &migrated.protocol.common().media.vehicle_images;
        assert_eq!(images.len(), 1);
        assert!(images[0].content_hash.is_none());
        assert!(migrated.warnings.iter().any(|w| w.contains("MissingImage")));
    }

    #[test]
    fn missing_license_plate_fails_the_record() {
        let service = MigrationService::new(seeded_store(), &config());
        let mut record = handover_record("p-3");
        record.data["rentalData"]["vehicle"]["licensePlate"] = json!("");
        let err = service.migrate(&record).unwrap_err();
        assert!(matches!(err, FleetdocError::Render(_)));
    }

    #[test]
    fn batch_isolates_invalid_records() {
        let mut service = MigrationService::new(seeded_store(), &config());
        let broken: LegacyProtocolRecord =
            serde_json::from_value(json!({ "id": "broken", "protocol_type": "handover" })).unwrap();
        let records = vec![handover_record("p-a"), broken, handover_record("p-b")];

        let options = MigrationOptions {
            skip_photos: true,
            ..MigrationOptions::default()
        };
        let progress = service.migrate_batch(&records, &options);
        assert_eq!(progress.processed, progress.total);
        assert_eq!(progress.successful, 2);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.errors[0].protocol_id, "broken");
        assert_eq!(progress.success_rate(), 67);
        assert!(progress.estimated_completion.is_some());
        assert_eq!(service.progress(), progress);
        assert!(service.store().exists("protocols/p-b/protocol.json").unwrap());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let store = seeded_store();
        let before = store.len();
        let mut service = MigrationService::new(store, &config());
        let options = MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        };
        let progress = service.migrate_batch(&[handover_record("p-d")], &options);
        assert_eq!(progress.successful, 1);
        assert_eq!(service.store().len(), before);
    }

    #[test]
    fn return_record_keeps_paid_refund() {
        let service = MigrationService::new(seeded_store(), &config());
        let mut record = handover_record("p-r");
        record.protocol_type = Some("return".into());
        record.pdf_url = None;
        record.data["vehicleCondition"]["odometer"] = json!(50300);
        record.data["vehicleCondition"]["fuelLevel"] = json!(80);
        record.data["handoverProtocolId"] = json!("p-1");
        record.data["handoverProtocol"] = json!({
            "id": "p-1",
            "vehicleCondition": { "odometer": 50000, "fuelLevel": 100 }
        });
        record.data["finalRefund"] = json!(450.0);

        let migrated = service
            .migrate_with(
                &record,
                &MigrationOptions {
                    skip_documents: true,
                    ..MigrationOptions::default()
                },
            )
            .unwrap();
        let Protocol::Return(ret) = &migrated.protocol else {
            panic!("expected a return protocol");
        };
        assert_eq!(ret.handover_id.to_string(), "p-1");
        let fees = ret.fees(&FeeConfig::default()).unwrap();
        assert_eq!(fees.computed_refund, Decimal::new(47960, 2));
        assert_eq!(fees.final_refund, Decimal::new(450, 0));
        assert!(migrated.protocol.common().document.is_none());
    }

    #[test]
    fn bare_row_passes_the_check_but_cannot_be_rebuilt() {
        let service = MigrationService::new(seeded_store(), &config());
        let mut record = handover_record("p-bare");
        record.data = serde_json::Value::Null;
        assert!(crate::is_valid_legacy_protocol(&record));
        let err = service.migrate(&record).unwrap_err();
        assert!(matches!(err, FleetdocError::Validation(ref m) if m.contains("data.rentalData")));
    }

    #[test]
    fn return_without_handover_condition_is_rejected() {
        let service = MigrationService::new(seeded_store(), &config());
        let mut record = handover_record("p-rx");
        record.protocol_type = Some("return".into());
        let err = service.migrate(&record).unwrap_err();
        assert!(
            matches!(err, FleetdocError::Validation(ref m) if m.contains("handoverProtocol"))
        );
    }

    #[test]
    fn batch_dry_run_counts_what_single_dry_run_accepts() {
        let mut service = MigrationService::new(seeded_store(), &config());
        let mut incomplete = handover_record("p-inc");
        incomplete.data["rentalData"] = serde_json::Value::Null;
        let records = vec![handover_record("p-ok"), incomplete];
        let options = MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        };

        let single: Vec<bool> = records
            .iter()
            .map(|record| service.migrate_with(record, &options).is_ok())
            .collect();
        assert_eq!(single, vec![true, false]);

        let progress = service.migrate_batch(&records, &options);
        assert_eq!(progress.successful, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.errors[0].protocol_id, "p-inc");
    }

    #[test]
    fn validate_migration_rechecks_every_artifact() {
        let service = MigrationService::new(seeded_store(), &config());
        let migrated = service.migrate(&handover_record("p-v")).unwrap();
        service.validate_migration(&migrated).unwrap();

        let document = migrated.protocol.common().document.clone().unwrap();
        service
            .store()
            .put(&document.storage_key, b"%PDF-1.7 tampered", "application/pdf")
            .unwrap();
        assert!(matches!(
            service.validate_migration(&migrated),
            Err(FleetdocError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn validate_migration_compares_photo_counts() {
        let service = MigrationService::new(seeded_store(), &config());
        let mut migrated = service.migrate(&handover_record("p-c")).unwrap();
        let Protocol::Handover(handover) = &mut migrated.protocol else {
            panic!("expected a handover protocol");
        };
        handover.common.media.vehicle_images.pop();
        assert!(matches!(
            service.validate_migration(&migrated),
            Err(FleetdocError::Validation(ref m)) if m.contains("photos")
        ));
    }

    #[test]
    fn rollback_removes_migrated_artifacts_only() {
        let service = MigrationService::new(seeded_store(), &config());
        let migrated = service.migrate(&handover_record("p-rb")).unwrap();
        let seeded = seeded_store().len();
        assert!(service.store().len() > seeded);

        let removed = service.rollback(&migrated).unwrap();
        assert_eq!(removed, migrated.manifest.len() + 1);
        assert_eq!(service.store().len(), seeded);
        assert!(service.store().exists("legacy/ph-1.jpg").unwrap());
        assert!(matches!(
            service.validate_migration(&migrated),
            Err(FleetdocError::StorageNotFound(_))
        ));
        assert_eq!(service.rollback(&migrated).unwrap(), 0);
    }
}
