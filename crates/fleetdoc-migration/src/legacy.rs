// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// First-generation protocol records as exported from the old database:
// a flat row (`id`, `protocol_type`, `photos`, `pdf_url`, ...) plus a
// loosely typed camelCase `data` payload.

use chrono::{DateTime, Utc};
use fleetdoc_core::error::FleetdocError;
use fleetdoc_core::types::{
    CustomerSummary, DamageRecord, DamageSeverity, FuelType, ImagePurpose, ProtocolKind,
    RentalSummary, SignatureImage, SignatureRecord, SignerRole, VehicleConditionSnapshot,
    VehicleSummary,
};
use fleetdoc_security::hash_bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A legacy record is missing or has malformed structural fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("legacy protocol {record_id}: {}", describe(.missing, .invalid))]
pub struct LegacyValidationError {
    pub record_id: String,
    /// Required fields that are absent or empty.
    pub missing: Vec<&'static str>,
    /// Fields that are present but unusable, with the reason.
    pub invalid: Vec<String>,
}

fn describe(missing: &[&'static str], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join(", ")));
    }
    parts.extend(invalid.iter().cloned());
    parts.join("; ")
}

impl From<LegacyValidationError> for FleetdocError {
    fn from(err: LegacyValidationError) -> Self {
        FleetdocError::Validation(err.to_string())
    }
}

/// One photo reference: a bare URL or an object with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyPhotoRef {
    Url(String),
    Object(LegacyPhoto),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPhoto {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl LegacyPhotoRef {
    /// The photo with an id. Bare URLs get a stable id derived from the
    /// URL so that re-running a migration writes the same keys.
    pub fn resolve(&self) -> LegacyPhoto {
        let mut photo = match self {
            Self::Url(url) => LegacyPhoto {
                id: None,
                url: url.clone(),
                description: None,
                category: None,
                captured_at: None,
            },
            Self::Object(photo) => photo.clone(),
        };
        if photo.id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            let digest = hash_bytes(photo.url.as_bytes());
            photo.id = Some(format!("legacy-{}", &digest[..16]));
        }
        photo
    }
}

impl LegacyPhoto {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Purpose from the legacy category, `fallback` when absent or unknown.
    pub fn purpose(&self, fallback: ImagePurpose) -> ImagePurpose {
        match self.category.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("vehicle") => ImagePurpose::Vehicle,
            Some("document") | Some("documents") => ImagePurpose::Document,
            Some("damage") | Some("damages") => ImagePurpose::Damage,
            Some("fuel") => ImagePurpose::Fuel,
            Some("odometer") => ImagePurpose::Odometer,
            _ => fallback,
        }
    }
}

/// A row of the first-generation protocol table.
///
/// Every field is optional at the serde level so that incomplete rows can
/// still be read and reported by [`validate`](Self::validate).
/// The serialised form matches the old table export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyProtocolRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "type")]
    pub protocol_type: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub rental_id: Option<String>,
    /// Aggregated photo rows. Required; an empty list is fine.
    #[serde(default)]
    pub photos: Option<Vec<LegacyPhotoRef>>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl LegacyProtocolRecord {
    /// Id for logs and error reports, even when the record has none.
    pub fn display_id(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => "<unknown>",
        }
    }

    pub fn photos(&self) -> &[LegacyPhotoRef] {
        self.photos.as_deref().unwrap_or_default()
    }

    pub fn kind(&self) -> Option<ProtocolKind> {
        match self.protocol_type.as_deref()?.trim().to_ascii_lowercase().as_str() {
            "handover" => Some(ProtocolKind::Handover),
            "return" => Some(ProtocolKind::Return),
            _ => None,
        }
    }

    /// Check the structural fields and report all problems at once:
    /// identity, type, the photo collection, creation time and the
    /// vehicle and customer links. The `data` payload is not inspected.
    pub fn validate(&self) -> Result<(), LegacyValidationError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.protocol_type) {
            missing.push("protocol_type");
        } else if self.kind().is_none() {
            invalid.push(format!(
                "unknown protocol_type {:?}",
                self.protocol_type.as_deref().unwrap_or_default()
            ));
        }
        if self.photos.is_none() {
            missing.push("photos");
        }
        if self.created_at.is_none() {
            missing.push("created_at");
        }
        if blank(&self.vehicle_id) {
            missing.push("vehicle_id");
        }
        if blank(&self.customer_id) {
            missing.push("customer_id");
        }

        if missing.is_empty() && invalid.is_empty() {
            Ok(())
        } else {
            Err(LegacyValidationError {
                record_id: self.display_id().to_owned(),
                missing,
                invalid,
            })
        }
    }

    /// Decode the `data` payload. An absent payload decodes to an empty
    /// one; whether it holds enough to rebuild a protocol is decided when
    /// the protocol is built.
    pub fn payload(&self) -> Result<LegacyPayload, LegacyValidationError> {
        let invalid = |reason: String| LegacyValidationError {
            record_id: self.display_id().to_owned(),
            missing: Vec::new(),
            invalid: vec![reason],
        };
        match &self.data {
            serde_json::Value::Null => Ok(LegacyPayload::default()),
            serde_json::Value::Object(_) => serde_json::from_value(self.data.clone())
                .map_err(|err| invalid(format!("data is malformed: {err}"))),
            _ => Err(invalid("data is not an object".into())),
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Whether `record` can be migrated. Never panics.
pub fn is_valid_legacy_protocol(record: &LegacyProtocolRecord) -> bool {
    record.validate().is_ok()
}

/// Storage key of a first-generation object URL.
///
/// The scheme, host, query and fragment are dropped; when `bucket` appears
/// as a path segment only the part after it is kept.
pub fn legacy_storage_key(url: &str, bucket: Option<&str>) -> String {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or_default(),
        None => url,
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_start_matches('/');

    if let Some(bucket) = bucket {
        let segments: Vec<&str> = path.split('/').collect();
        if let Some(position) = segments.iter().position(|segment| *segment == bucket) {
            return segments[position + 1..].join("/");
        }
    }
    path.to_owned()
}

// -- Payload ------------------------------------------------------------------

/// The `data` column.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyPayload {
    pub location: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub vehicle_condition: Option<LegacyCondition>,
    pub rental_data: Option<LegacyRental>,
    pub vehicle_images: Vec<LegacyPhotoRef>,
    pub document_images: Vec<LegacyPhotoRef>,
    pub damage_images: Vec<LegacyPhotoRef>,
    pub damages: Vec<LegacyDamage>,
    pub new_damages: Vec<LegacyDamage>,
    pub signatures: Vec<LegacySignature>,
    pub handover_protocol_id: Option<String>,
    pub handover_protocol: Option<LegacyHandoverRef>,
    pub additional_charges: Option<Decimal>,
    /// Refund actually paid out by the first-generation system.
    pub final_refund: Option<Decimal>,
}

impl LegacyPayload {
    pub fn handover_id(&self) -> Option<&str> {
        self.handover_protocol_id
            .as_deref()
            .or_else(|| self.handover_protocol.as_ref()?.id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

/// The embedded handover a legacy return points at.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyHandoverRef {
    pub id: Option<String>,
    pub vehicle_condition: Option<LegacyCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyCondition {
    pub odometer: Option<f64>,
    pub fuel_level: Option<f64>,
    pub fuel_type: Option<String>,
    pub exterior_condition: Option<String>,
    pub interior_condition: Option<String>,
    pub notes: Option<String>,
}

impl LegacyCondition {
    /// Odometer is rounded to whole kilometres; fuel is clamped to 0-100.
    pub fn to_snapshot(&self) -> VehicleConditionSnapshot {
        VehicleConditionSnapshot {
            odometer: self.odometer.unwrap_or(0.0).round().clamp(0.0, u32::MAX as f64) as u32,
            fuel_level: self.fuel_level.unwrap_or(0.0).round().clamp(0.0, 100.0) as u8,
            fuel_type: fuel_type(self.fuel_type.as_deref()),
            exterior_condition: self.exterior_condition.clone().unwrap_or_default(),
            interior_condition: self.interior_condition.clone().unwrap_or_default(),
            notes: self.notes.clone().filter(|n| !n.trim().is_empty()),
        }
    }
}

fn fuel_type(raw: Option<&str>) -> FuelType {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("diesel") | Some("nafta") => FuelType::Diesel,
        Some("electric") | Some("ev") => FuelType::Electric,
        Some("hybrid") => FuelType::Hybrid,
        Some("gasoline") | Some("petrol") | Some("benzin") | None => FuelType::Gasoline,
        Some(other) => {
            debug!(fuel_type = other, "Unknown legacy fuel type, assuming gasoline");
            FuelType::Gasoline
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyRental {
    pub order_number: Option<String>,
    pub vehicle: Option<LegacyVehicle>,
    pub vehicle_vin: Option<String>,
    pub customer: Option<LegacyCustomer>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_price: Option<Decimal>,
    pub deposit: Option<Decimal>,
    pub currency: Option<String>,
    pub allowed_kilometers: Option<f64>,
    pub extra_kilometer_rate: Option<Decimal>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyVehicle {
    pub license_plate: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyCustomer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl LegacyRental {
    /// Frozen rental snapshot. Dates default to `fallback`; an allowance of
    /// zero kilometres meant "unlimited" in the first generation.
    pub fn to_summary(&self, fallback: DateTime<Utc>) -> RentalSummary {
        let vehicle = self.vehicle.clone().unwrap_or_default();
        let customer = self.customer.clone().unwrap_or_default();
        RentalSummary {
            order_number: self.order_number.clone().unwrap_or_default(),
            vehicle: VehicleSummary {
                license_plate: vehicle.license_plate.unwrap_or_default(),
                brand: vehicle.brand.unwrap_or_default(),
                model: vehicle.model.unwrap_or_default(),
                vin: vehicle.vin.or_else(|| self.vehicle_vin.clone()),
                company: vehicle.company,
            },
            customer: CustomerSummary {
                name: customer.name.unwrap_or_default(),
                email: customer.email.unwrap_or_default(),
                phone: customer.phone,
            },
            start_date: self.start_date.unwrap_or(fallback),
            end_date: self.end_date.or(self.start_date).unwrap_or(fallback),
            total_price: self.total_price.unwrap_or_default(),
            deposit: self.deposit.unwrap_or_default(),
            currency: self.currency.clone().unwrap_or_else(|| "EUR".into()),
            allowed_kilometers: self
                .allowed_kilometers
                .filter(|km| *km > 0.0)
                .map(|km| km.round().min(u32::MAX as f64) as u32),
            extra_kilometer_rate: self.extra_kilometer_rate,
            pickup_location: self.pickup_location.clone(),
            return_location: self.return_location.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyDamage {
    pub id: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub location: Option<String>,
    pub images: Vec<LegacyPhotoRef>,
    pub timestamp: Option<DateTime<Utc>>,
    pub from_previous_protocol: Option<bool>,
}

impl LegacyDamage {
    /// `photos` must be the resolved form of `self.images`, in order.
    pub fn to_record(
        &self,
        index: usize,
        photos: &[LegacyPhoto],
        fallback_time: DateTime<Utc>,
        from_previous: bool,
    ) -> DamageRecord {
        DamageRecord {
            id: self
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("damage-{}", index + 1)),
            description: self.description.clone().unwrap_or_default(),
            severity: severity(self.severity.as_deref()),
            location: self.location.clone().unwrap_or_default(),
            image_ids: photos.iter().map(|photo| photo.id().to_owned()).collect(),
            captured_at: self.timestamp.unwrap_or(fallback_time),
            from_previous_protocol: self.from_previous_protocol.unwrap_or(from_previous),
        }
    }
}

fn severity(raw: Option<&str>) -> DamageSeverity {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("low") | Some("minor") => DamageSeverity::Low,
        Some("high") | Some("major") | Some("severe") => DamageSeverity::High,
        _ => DamageSeverity::Medium,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacySignature {
    pub id: Option<String>,
    /// Base64 data URL from the signature pad.
    pub signature: Option<String>,
    pub signer_name: Option<String>,
    pub signer_role: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub ip_address: Option<String>,
}

impl LegacySignature {
    pub fn to_record(&self, index: usize, fallback_time: DateTime<Utc>) -> SignatureRecord {
        SignatureRecord {
            id: self
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("signature-{}", index + 1)),
            image: SignatureImage::DataUrl(self.signature.clone().unwrap_or_default()),
            signer_name: self.signer_name.clone().unwrap_or_default(),
            signer_role: match self.signer_role.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("employee") => SignerRole::Employee,
                _ => SignerRole::Customer,
            },
            signed_at: self.timestamp.unwrap_or(fallback_time),
            location: self.location.clone().unwrap_or_default(),
            ip_address: self.ip_address.as_deref().and_then(|ip| ip.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(data: serde_json::Value) -> LegacyProtocolRecord {
        serde_json::from_value(json!({
            "id": "p-1",
            "protocol_type": "handover",
            "vehicle_id": "v-1",
            "customer_id": "c-1",
            "created_at": "2024-05-01T08:00:00Z",
            "photos": [],
            "data": data,
        }))
        .unwrap()
    }

    fn payload() -> serde_json::Value {
        json!({
            "location": "Bratislava",
            "vehicleCondition": { "odometer": 50000.4, "fuelLevel": 100, "fuelType": "diesel",
                                  "exteriorCondition": "OK", "interiorCondition": "OK" },
            "rentalData": {
                "orderNumber": "OBJ-1",
                "vehicle": { "licensePlate": "BA-123XY", "brand": "Škoda", "model": "Octavia" },
                "customer": { "name": "Ján Kováč", "email": "jan@example.sk" },
                "totalPrice": 240.0, "deposit": 500, "currency": "EUR", "allowedKilometers": 0
            }
        })
    }

    #[test]
    fn complete_record_is_valid() {
        let record = record(payload());
        assert!(is_valid_legacy_protocol(&record));
        let payload = record.payload().unwrap();
        let rental = payload.rental_data.unwrap().to_summary(Utc::now());
        assert_eq!(rental.vehicle.license_plate, "BA-123XY");
        assert_eq!(rental.deposit, Decimal::new(500, 0));
        assert_eq!(rental.allowed_kilometers, None);
        assert!(record.photos().is_empty());
    }

    #[test]
    fn bare_table_row_is_valid() {
        let record: LegacyProtocolRecord = serde_json::from_value(json!({
            "id": "legacy-1",
            "type": "handover",
            "photos": ["https://cdn.example.com/legacy/a.jpg"],
            "created_at": "2024-01-01T00:00:00Z",
            "vehicle_id": "vehicle-1",
            "customer_id": "customer-1"
        }))
        .unwrap();
        assert!(is_valid_legacy_protocol(&record));
        assert_eq!(record.payload().unwrap(), LegacyPayload::default());
    }

    #[test]
    fn photo_collection_is_required() {
        let mut record = record(payload());
        record.photos = None;
        assert!(!is_valid_legacy_protocol(&record));
        assert_eq!(record.validate().unwrap_err().missing, vec!["photos"]);

        let null_photos: LegacyProtocolRecord = serde_json::from_value(json!({
            "id": "p-2", "type": "handover", "photos": null,
            "created_at": "2024-05-01T08:00:00Z", "vehicle_id": "v-1", "customer_id": "c-1"
        }))
        .unwrap();
        assert!(!is_valid_legacy_protocol(&null_photos));
    }

    #[test]
    fn names_every_missing_field() {
        let record: LegacyProtocolRecord =
            serde_json::from_value(json!({ "id": "p-9", "type": "return" })).unwrap();
        let err = record.validate().unwrap_err();
        assert_eq!(err.record_id, "p-9");
        assert_eq!(err.missing, vec!["photos", "created_at", "vehicle_id", "customer_id"]);
        assert!(!is_valid_legacy_protocol(&record));
        assert!(matches!(FleetdocError::from(err), FleetdocError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut record = record(payload());
        record.protocol_type = Some("inspection".into());
        let err = record.validate().unwrap_err();
        assert_eq!(err.invalid.len(), 1);
        assert!(err.to_string().contains("inspection"));
    }

    #[test]
    fn non_object_payload_is_rejected_on_decode() {
        let record = record(json!([1, 2, 3]));
        assert!(is_valid_legacy_protocol(&record));
        let err = record.payload().unwrap_err();
        assert!(err.to_string().contains("data is not an object"));
    }

    #[test]
    fn empty_record_never_panics() {
        let err = LegacyProtocolRecord::default().validate().unwrap_err();
        assert_eq!(err.record_id, "<unknown>");
        assert!(err.missing.contains(&"id"));
    }

    #[test]
    fn condition_is_normalised() {
        let condition = LegacyCondition {
            odometer: Some(50_000.6),
            fuel_level: Some(140.0),
            fuel_type: Some("Nafta".into()),
            ..LegacyCondition::default()
        }
        .to_snapshot();
        assert_eq!(condition.odometer, 50_001);
        assert_eq!(condition.fuel_level, 100);
        assert_eq!(condition.fuel_type, FuelType::Diesel);
    }

    #[test]
    fn photos_accept_strings_and_objects() {
        let photos: Vec<LegacyPhotoRef> = serde_json::from_value(json!([
            "https://cdn.example.com/legacy-bucket/protocols/p-1/a.jpg",
            { "id": "ph-2", "url": "protocols/p-1/b.jpg", "category": "document" }
        ]))
        .unwrap();
        let first = photos[0].resolve();
        assert!(first.id().starts_with("legacy-"));
        assert_eq!(first.id(), photos[0].resolve().id());
        let second = photos[1].resolve();
        assert_eq!(second.id(), "ph-2");
        assert_eq!(second.purpose(ImagePurpose::Vehicle), ImagePurpose::Document);
    }

    #[test]
    fn storage_key_from_url() {
        let url = "https://cdn.example.com/legacy-bucket/protocols/p-1/a.jpg?v=2";
        assert_eq!(
            legacy_storage_key(url, Some("legacy-bucket")),
            "protocols/p-1/a.jpg"
        );
        assert_eq!(
            legacy_storage_key(url, None),
            "legacy-bucket/protocols/p-1/a.jpg"
        );
        assert_eq!(legacy_storage_key("/protocols/p-1/b.jpg", None), "protocols/p-1/b.jpg");
    }
}
