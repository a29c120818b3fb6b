// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: handover/return protocols and everything they own.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FeeConfig;
use crate::error::{FleetdocError, Result};
use crate::fees::{ReturnFeeInputs, ReturnFees, compute_return_fees};

/// Unique identifier for a protocol.
///
/// Legacy records carry free-form string ids, so the wrapper holds a string
/// rather than a raw UUID. Freshly created protocols get a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolId(pub String);

impl ProtocolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Short upper-case form printed on documents (last eight characters).
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(8);
        chars[start..].iter().collect::<String>().to_uppercase()
    }
}

impl Default for ProtocolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A5,
    Letter,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }
}

/// Which inspection a protocol records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Handover,
    Return,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handover => "handover",
            Self::Return => "return",
        }
    }
}

/// Lifecycle states of a protocol. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolStatus {
    Draft,
    Completed,
    Cancelled,
}

impl std::fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Draft => "draft",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
    Hybrid,
}

/// Vehicle condition captured at handover or return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConditionSnapshot {
    /// Odometer reading in kilometres.
    pub odometer: u32,
    /// Fuel (or charge) level in percent, 0-100.
    pub fuel_level: u8,
    pub fuel_type: FuelType,
    pub exterior_condition: String,
    pub interior_condition: String,
    pub notes: Option<String>,
}

impl VehicleConditionSnapshot {
    /// A snapshot nobody filled in: zero odometer and no condition text.
    pub fn is_empty(&self) -> bool {
        self.odometer == 0
            && self.exterior_condition.trim().is_empty()
            && self.interior_condition.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageSeverity {
    Low,
    Medium,
    High,
}

impl DamageSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// One documented damage on the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub id: String,
    pub description: String,
    pub severity: DamageSeverity,
    /// Free-text position on the vehicle ("rear bumper, left").
    pub location: String,
    /// Ids of the [`ProtocolImage`]s showing this damage.
    pub image_ids: Vec<String>,
    pub captured_at: DateTime<Utc>,
    /// Carried over from the handover protocol rather than found at return.
    pub from_previous_protocol: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerRole {
    Customer,
    Employee,
}

impl SignerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Employee => "employee",
        }
    }
}

/// Captured signature image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SignatureImage {
    /// `data:image/png;base64,...` as produced by signature pads.
    DataUrl(String),
    /// Already-decoded encoded image bytes.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: String,
    pub image: SignatureImage,
    pub signer_name: String,
    pub signer_role: SignerRole,
    pub signed_at: DateTime<Utc>,
    pub location: String,
    pub ip_address: Option<IpAddr>,
}

/// Why a photo was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePurpose {
    Vehicle,
    Document,
    Damage,
    Fuel,
    Odometer,
}

/// Reference to a photo; the bytes and derivatives live in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolImage {
    pub id: String,
    pub purpose: ImagePurpose,
    pub description: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// SHA-256 of the original upload, once derivatives exist.
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolVideo {
    pub id: String,
    pub purpose: ImagePurpose,
    pub description: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub storage_key: String,
    pub duration_secs: Option<f32>,
}

/// Media partitioned by purpose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMedia {
    pub vehicle_images: Vec<ProtocolImage>,
    pub document_images: Vec<ProtocolImage>,
    pub damage_images: Vec<ProtocolImage>,
    pub videos: Vec<ProtocolVideo>,
}

impl ProtocolMedia {
    /// Every image regardless of purpose, vehicle first.
    pub fn all_images(&self) -> impl Iterator<Item = &ProtocolImage> {
        self.vehicle_images
            .iter()
            .chain(self.document_images.iter())
            .chain(self.damage_images.iter())
    }

    /// Push an image into the collection matching its purpose. Fuel and
    /// odometer shots are vehicle photos.
    pub fn push(&mut self, image: ProtocolImage) {
        match image.purpose {
            ImagePurpose::Document => self.document_images.push(image),
            ImagePurpose::Damage => self.damage_images.push(image),
            ImagePurpose::Vehicle | ImagePurpose::Fuel | ImagePurpose::Odometer => {
                self.vehicle_images.push(image)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub license_plate: String,
    pub brand: String,
    pub model: String,
    pub vin: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Rental facts frozen when the protocol is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalSummary {
    pub order_number: String,
    pub vehicle: VehicleSummary,
    pub customer: CustomerSummary,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_price: Decimal,
    pub deposit: Decimal,
    pub currency: String,
    /// `None` means unlimited kilometres.
    pub allowed_kilometers: Option<u32>,
    pub extra_kilometer_rate: Option<Decimal>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
}

/// The archival document generated for a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub storage_key: String,
    pub content_hash: String,
    pub byte_size: u64,
    pub page_count: u32,
}

/// Fields shared by handover and return protocols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCommon {
    pub id: ProtocolId,
    pub rental_id: String,
    status: ProtocolStatus,
    pub created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    pub location: String,
    pub created_by: String,
    pub rental: RentalSummary,
    vehicle_condition: Option<VehicleConditionSnapshot>,
    pub media: ProtocolMedia,
    pub damages: Vec<DamageRecord>,
    pub signatures: Vec<SignatureRecord>,
    pub notes: Option<String>,
    pub document: Option<GeneratedDocument>,
}

impl ProtocolCommon {
    /// Start a new draft.
    pub fn new(
        rental_id: impl Into<String>,
        rental: RentalSummary,
        location: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: ProtocolId::new(),
            rental_id: rental_id.into(),
            status: ProtocolStatus::Draft,
            created_at: Utc::now(),
            completed_at: None,
            location: location.into(),
            created_by: created_by.into(),
            rental,
            vehicle_condition: None,
            media: ProtocolMedia::default(),
            damages: Vec::new(),
            signatures: Vec::new(),
            notes: None,
            document: None,
        }
    }

    pub fn status(&self) -> ProtocolStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn vehicle_condition(&self) -> Option<&VehicleConditionSnapshot> {
        self.vehicle_condition.as_ref()
    }

    /// Record the vehicle condition. Only drafts accept a new snapshot.
    pub fn set_vehicle_condition(&mut self, snapshot: VehicleConditionSnapshot) -> Result<()> {
        self.ensure_draft("update vehicle condition")?;
        self.vehicle_condition = Some(snapshot);
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> Result<()> {
        if self.status == ProtocolStatus::Draft {
            Ok(())
        } else {
            Err(FleetdocError::Validation(format!(
                "cannot {action}: protocol {} is {}",
                self.id, self.status
            )))
        }
    }

    fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        let reject = |reason: &str| FleetdocError::InvalidTransition {
            from: self.status.to_string(),
            to: ProtocolStatus::Completed.to_string(),
            reason: reason.to_owned(),
        };
        if self.status != ProtocolStatus::Draft {
            return Err(reject("only drafts can be completed"));
        }
        if self.signatures.is_empty() {
            return Err(reject("at least one signature is required"));
        }
        match &self.vehicle_condition {
            Some(snapshot) if !snapshot.is_empty() => {}
            _ => return Err(reject("vehicle condition snapshot is missing")),
        }
        self.status = ProtocolStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if self.status != ProtocolStatus::Draft {
            return Err(FleetdocError::InvalidTransition {
                from: self.status.to_string(),
                to: ProtocolStatus::Cancelled.to_string(),
                reason: "only drafts can be cancelled".into(),
            });
        }
        self.status = ProtocolStatus::Cancelled;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverProtocol {
    #[serde(flatten)]
    pub common: ProtocolCommon,
}

impl HandoverProtocol {
    pub fn new(common: ProtocolCommon) -> Self {
        Self { common }
    }
}

/// Return inspection. Fee figures are derived from the snapshot fields on
/// every call to [`ReturnProtocol::fees`] and are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnProtocol {
    #[serde(flatten)]
    pub common: ProtocolCommon,
    pub handover_id: ProtocolId,
    /// Condition recorded at handover; source of the start odometer/fuel.
    pub handover_condition: VehicleConditionSnapshot,
    /// Damages found at return, distinct from carried-over ones in
    /// `common.damages`.
    pub new_damages: Vec<DamageRecord>,
    /// Manually entered extra charges (cleaning, lost key, ...).
    pub additional_charges: Decimal,
    /// Operator-entered refund; recorded next to the computed figure.
    pub refund_override: Option<Decimal>,
}

impl ReturnProtocol {
    /// Open a return draft for the rental recorded by `handover`.
    ///
    /// The rental summary and the handover condition are frozen into the
    /// new protocol, and the handover's damages are carried over with
    /// `from_previous_protocol` set.
    pub fn from_handover(
        handover: &HandoverProtocol,
        location: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Result<Self> {
        let handover_condition = handover
            .common
            .vehicle_condition()
            .cloned()
            .ok_or_else(|| {
                FleetdocError::Validation(format!(
                    "handover {} has no vehicle condition snapshot",
                    handover.common.id
                ))
            })?;

        let mut common = ProtocolCommon::new(
            handover.common.rental_id.clone(),
            handover.common.rental.clone(),
            location,
            created_by,
        );
        common.damages = handover
            .common
            .damages
            .iter()
            .cloned()
            .map(|mut damage| {
                damage.from_previous_protocol = true;
                damage
            })
            .collect();

        Ok(Self {
            common,
            handover_id: handover.common.id.clone(),
            handover_condition,
            new_damages: Vec::new(),
            additional_charges: Decimal::ZERO,
            refund_override: None,
        })
    }

    /// Fee inputs, or `None` while the return condition is not captured.
    pub fn fee_inputs(&self, config: &FeeConfig) -> Option<ReturnFeeInputs> {
        let returned = self.common.vehicle_condition()?;
        let rental = &self.common.rental;
        Some(ReturnFeeInputs {
            odometer_start: self.handover_condition.odometer,
            odometer_end: returned.odometer,
            allowed_kilometers: rental.allowed_kilometers,
            extra_kilometer_rate: rental
                .extra_kilometer_rate
                .unwrap_or(config.default_extra_kilometer_rate),
            fuel_level_start: self.handover_condition.fuel_level,
            fuel_level_end: returned.fuel_level,
            deposit: rental.deposit,
            additional_charges: self.additional_charges,
            refund_override: self.refund_override,
        })
    }

    pub fn fees(&self, config: &FeeConfig) -> Option<ReturnFees> {
        self.fee_inputs(config)
            .map(|inputs| compute_return_fees(&inputs, config))
    }
}

/// A protocol of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Protocol {
    Handover(HandoverProtocol),
    Return(ReturnProtocol),
}

impl Protocol {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::Handover(_) => ProtocolKind::Handover,
            Self::Return(_) => ProtocolKind::Return,
        }
    }

    pub fn common(&self) -> &ProtocolCommon {
        match self {
            Self::Handover(p) => &p.common,
            Self::Return(p) => &p.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut ProtocolCommon {
        match self {
            Self::Handover(p) => &mut p.common,
            Self::Return(p) => &mut p.common,
        }
    }

    pub fn id(&self) -> &ProtocolId {
        &self.common().id
    }

    /// `draft → completed`. Needs a signature and a filled-in condition.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.common_mut().complete(at)
    }

    /// `draft → cancelled`.
    pub fn cancel(&mut self) -> Result<()> {
        self.common_mut().cancel()
    }

    /// Attach the generated archival document reference and hash.
    pub fn attach_document(&mut self, document: GeneratedDocument) {
        self.common_mut().document = Some(document);
    }

    /// Every damage on the protocol; for returns the new ones follow the
    /// carried-over ones.
    pub fn all_damages(&self) -> Vec<&DamageRecord> {
        match self {
            Self::Handover(p) => p.common.damages.iter().collect(),
            Self::Return(p) => p
                .common
                .damages
                .iter()
                .chain(p.new_damages.iter())
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn rental() -> RentalSummary {
        RentalSummary {
            order_number: "OBJ-2024-0042".into(),
            vehicle: VehicleSummary {
                license_plate: "BA-123XY".into(),
                brand: "Škoda".into(),
                model: "Octavia".into(),
                vin: Some("TMBJJ7NE0K0123456".into()),
                company: Some("Požičovňa s.r.o.".into()),
            },
            customer: CustomerSummary {
                name: "Ján Kováč".into(),
                email: "jan.kovac@example.sk".into(),
                phone: None,
            },
            start_date: Utc::now(),
            end_date: Utc::now(),
            total_price: Decimal::new(24000, 2),
            deposit: Decimal::new(50000, 2),
            currency: "EUR".into(),
            allowed_kilometers: Some(200),
            extra_kilometer_rate: Some(Decimal::new(20, 2)),
            pickup_location: None,
            return_location: None,
        }
    }

    pub fn condition(odometer: u32, fuel_level: u8) -> VehicleConditionSnapshot {
        VehicleConditionSnapshot {
            odometer,
            fuel_level,
            fuel_type: FuelType::Diesel,
            exterior_condition: "Bez poškodení".into(),
            interior_condition: "Čistý".into(),
            notes: None,
        }
    }

    pub fn signature() -> SignatureRecord {
        SignatureRecord {
            id: "sig-1".into(),
            image: SignatureImage::DataUrl("data:image/png;base64,".into()),
            signer_name: "Ján Kováč".into(),
            signer_role: SignerRole::Customer,
            signed_at: Utc::now(),
            location: "Bratislava".into(),
            ip_address: None,
        }
    }

    pub fn handover() -> HandoverProtocol {
        let mut common = ProtocolCommon::new("rental-1", rental(), "Bratislava", "employee-7");
        common.set_vehicle_condition(condition(50_000, 100)).unwrap();
        HandoverProtocol::new(common)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn complete_requires_signature() {
        let mut protocol = Protocol::Handover(handover());
        let err = protocol.complete(Utc::now()).unwrap_err();
        assert!(matches!(err, FleetdocError::InvalidTransition { .. }));
        assert_eq!(protocol.common().status(), ProtocolStatus::Draft);
    }

    #[test]
    fn complete_requires_condition() {
        let mut common = ProtocolCommon::new("rental-1", rental(), "Bratislava", "employee-7");
        common.signatures.push(signature());
        let mut protocol = Protocol::Handover(HandoverProtocol::new(common));
        assert!(protocol.complete(Utc::now()).is_err());
    }

    #[test]
    fn completed_is_terminal() {
        let mut handover = handover();
        handover.common.signatures.push(signature());
        let mut protocol = Protocol::Handover(handover);
        protocol.complete(Utc::now()).unwrap();
        assert_eq!(protocol.common().status(), ProtocolStatus::Completed);
        assert!(protocol.common().completed_at().is_some());

        assert!(protocol.cancel().is_err());
        assert!(protocol.complete(Utc::now()).is_err());
        assert!(
            protocol
                .common_mut()
                .set_vehicle_condition(condition(1, 1))
                .is_err()
        );
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut protocol = Protocol::Handover(handover());
        protocol.cancel().unwrap();
        assert_eq!(protocol.common().status(), ProtocolStatus::Cancelled);
        assert!(protocol.complete(Utc::now()).is_err());
    }

    #[test]
    fn return_carries_damages_and_condition() {
        let mut handover = handover();
        handover.common.damages.push(DamageRecord {
            id: "d1".into(),
            description: "Škrabanec".into(),
            severity: DamageSeverity::Low,
            location: "zadný nárazník".into(),
            image_ids: vec![],
            captured_at: Utc::now(),
            from_previous_protocol: false,
        });
        let ret = ReturnProtocol::from_handover(&handover, "Košice", "employee-9").unwrap();
        assert_eq!(ret.handover_id, handover.common.id);
        assert_eq!(ret.handover_condition.odometer, 50_000);
        assert!(ret.common.damages.iter().all(|d| d.from_previous_protocol));
        assert!(ret.common.vehicle_condition().is_none());
        assert!(ret.fees(&FeeConfig::default()).is_none());
    }

    #[test]
    fn return_fees_follow_snapshot() {
        let mut ret =
            ReturnProtocol::from_handover(&handover(), "Košice", "employee-9").unwrap();
        ret.common
            .set_vehicle_condition(condition(50_300, 100))
            .unwrap();
        let fees = ret.fees(&FeeConfig::default()).unwrap();
        assert_eq!(fees.kilometer_overage, 100);
        assert_eq!(fees.kilometer_fee, Decimal::new(2000, 2));

        ret.common
            .set_vehicle_condition(condition(50_150, 100))
            .unwrap();
        let fees = ret.fees(&FeeConfig::default()).unwrap();
        assert_eq!(fees.kilometer_overage, 0);
    }

    #[test]
    fn serde_tagged_variant() {
        let protocol = Protocol::Handover(handover());
        let json = serde_json::to_value(&protocol).unwrap();
        assert_eq!(json["type"], "handover");
        let back: Protocol = serde_json::from_value(json).unwrap();
        assert_eq!(back, protocol);
    }

    #[test]
    fn short_id_is_last_eight_upper() {
        let id = ProtocolId::from("protocol-v1-abcdef12");
        assert_eq!(id.short(), "ABCDEF12");
        assert_eq!(ProtocolId::from("ab").short(), "AB");
    }
}
