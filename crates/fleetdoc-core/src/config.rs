// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Every component receives its own record at
// construction; nothing here is global.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::PaperSize;

/// Encoded output format of a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeFormat {
    Jpeg,
    WebP,
    Png,
}

impl DerivativeFormat {
    /// MIME type used when the derivative is uploaded.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Png => "image/png",
        }
    }

    /// File extension used in storage keys.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Png => "png",
        }
    }
}

/// Size and encoding target for one derivative variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Cap on the longer edge in pixels. Images are never upscaled.
    pub max_edge: u32,
    /// Encoder quality, 1-100.
    pub quality: u8,
    pub format: DerivativeFormat,
}

/// Image Derivative Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivativeConfig {
    pub thumbnail: VariantSpec,
    pub gallery: VariantSpec,
    pub document: VariantSpec,
    /// Sources wider or taller than this are rejected before decoding.
    pub max_source_edge: u32,
    /// Upper bound on decoder allocations, in bytes.
    pub max_decode_alloc: u64,
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumbnail: VariantSpec {
                max_edge: 150,
                quality: 60,
                format: DerivativeFormat::WebP,
            },
            gallery: VariantSpec {
                max_edge: 1280,
                quality: 80,
                format: DerivativeFormat::Jpeg,
            },
            document: VariantSpec {
                max_edge: 960,
                quality: 75,
                format: DerivativeFormat::Jpeg,
            },
            max_source_edge: 12_000,
            max_decode_alloc: 512 * 1024 * 1024,
        }
    }
}

/// Document Assembler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub paper_size: PaperSize,
    /// Page margin on every side, in points.
    pub margin_pt: f32,
    /// Company name printed in the header.
    pub company_name: String,
    /// Regular-weight font files tried in order. The first one that loads is
    /// embedded; if none loads the built-in Helvetica is used.
    pub font_candidates: Vec<PathBuf>,
    /// Bold-weight counterparts, tried in order. Falls back to the regular
    /// face when none loads.
    pub bold_font_candidates: Vec<PathBuf>,
    /// Resolution assumed when placing raster images.
    pub image_dpi: f32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            margin_pt: 50.0,
            company_name: "Fleetdoc".into(),
            font_candidates: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf"),
            ],
            bold_font_candidates: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf"),
            ],
            image_dpi: 150.0,
        }
    }
}

/// Return-fee settings that are not part of the rental contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Refill cost charged per missing percentage point of fuel.
    pub fuel_refill_cost_per_percent: Decimal,
    /// Rate applied when the rental snapshot carries no extra-kilometre rate.
    pub default_extra_kilometer_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fuel_refill_cost_per_percent: Decimal::new(2, 2),
            default_extra_kilometer_rate: Decimal::new(50, 2),
        }
    }
}

/// Legacy migration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Maximum number of per-record errors kept in the progress report.
    pub max_error_entries: usize,
    /// Bucket name found in first-generation object URLs. The storage key
    /// is the path after this segment; without it the whole URL path is
    /// used.
    pub source_bucket: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_error_entries: 100,
            source_bucket: None,
        }
    }
}

/// All settings for one pipeline instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetdocConfig {
    pub derivatives: DerivativeConfig,
    pub document: DocumentConfig,
    pub fees: FeeConfig,
    pub migration: MigrationConfig,
}

impl FleetdocConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(config)
    }

    /// Persist settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "Configuration saved");
        Ok(())
    }
}
