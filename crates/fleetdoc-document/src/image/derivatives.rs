// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image Derivative Engine: one uploaded photo in, three fingerprinted
// renditions out (thumbnail, gallery, document copy).

use std::time::Instant;

use fleetdoc_core::config::{DerivativeConfig, DerivativeFormat, VariantSpec};
use fleetdoc_core::error::Result;
use fleetdoc_security::{ManifestEntry, hash_bytes};
use fleetdoc_storage::BlobStore;
use fleetdoc_storage::keys::photo_key;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::processor::{DecodeLimits, ImageProcessor};

/// The three renditions produced for every photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeKind {
    Thumbnail,
    Gallery,
    DocumentCopy,
}

impl DerivativeKind {
    pub const ALL: [DerivativeKind; 3] = [Self::Thumbnail, Self::Gallery, Self::DocumentCopy];

    /// Directory segment used in storage keys.
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumb",
            Self::Gallery => "gallery",
            Self::DocumentCopy => "pdf",
        }
    }

    pub fn storage_key(&self, protocol_id: &str, photo_id: &str, format: DerivativeFormat) -> String {
        photo_key(protocol_id, self.directory(), photo_id, format.extension())
    }
}

/// One encoded rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub kind: DerivativeKind,
    pub format: DerivativeFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub content_hash: String,
}

impl Derivative {
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn media_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn long_edge(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Byte sizes of the original and each rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeSizes {
    pub original: u64,
    pub thumbnail: u64,
    pub gallery: u64,
    pub document_copy: u64,
}

/// Everything produced from one source photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDerivativeSet {
    /// SHA-256 of the original bytes, taken before any transformation.
    pub content_hash: String,
    pub original_size: u64,
    /// Upright dimensions of the source (after EXIF orientation).
    pub original_dimensions: (u32, u32),
    /// Detected source format, e.g. `"Jpeg"`.
    pub source_format: Option<String>,
    pub thumbnail: Derivative,
    pub gallery: Derivative,
    pub document_copy: Derivative,
}

impl ImageDerivativeSet {
    pub fn get(&self, kind: DerivativeKind) -> &Derivative {
        match kind {
            DerivativeKind::Thumbnail => &self.thumbnail,
            DerivativeKind::Gallery => &self.gallery,
            DerivativeKind::DocumentCopy => &self.document_copy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Derivative> {
        DerivativeKind::ALL.into_iter().map(|kind| self.get(kind))
    }

    pub fn sizes(&self) -> DerivativeSizes {
        DerivativeSizes {
            original: self.original_size,
            thumbnail: self.thumbnail.byte_size(),
            gallery: self.gallery.byte_size(),
            document_copy: self.document_copy.byte_size(),
        }
    }

    /// Manifest entries for the three renditions, named by storage key.
    pub fn manifest_entries(&self, protocol_id: &str, photo_id: &str) -> Vec<ManifestEntry> {
        self.iter()
            .map(|derivative| {
                ManifestEntry::new(
                    derivative.kind.storage_key(protocol_id, photo_id, derivative.format),
                    derivative.content_hash.clone(),
                    derivative.byte_size(),
                )
            })
            .collect()
    }

    /// Upload the renditions and return their storage keys in
    /// thumbnail, gallery, document-copy order.
    pub fn store(&self, store: &dyn BlobStore, protocol_id: &str, photo_id: &str) -> Result<Vec<String>> {
        self.iter()
            .map(|derivative| {
                let key = derivative.kind.storage_key(protocol_id, photo_id, derivative.format);
                store.put(&key, &derivative.bytes, derivative.media_type())?;
                Ok(key)
            })
            .collect()
    }
}

/// Produces [`ImageDerivativeSet`]s. Holds only configuration, so one
/// engine can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct DerivativeEngine {
    config: DerivativeConfig,
}

impl DerivativeEngine {
    pub fn new(config: DerivativeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DerivativeConfig {
        &self.config
    }

    fn limits(&self) -> DecodeLimits {
        DecodeLimits::from(&self.config)
    }

    /// Derive thumbnail, gallery and document copy from one photo.
    #[instrument(skip(self, source), fields(source_len = source.len()))]
    pub fn process(&self, source: &[u8]) -> Result<ImageDerivativeSet> {
        let start = Instant::now();
        let content_hash = hash_bytes(source);

        let processor = ImageProcessor::decode(source, self.limits())?;
        let original_dimensions = (processor.width(), processor.height());

        let gallery = render_variant(&processor, DerivativeKind::Gallery, &self.config.gallery)?;
        let document_copy =
            render_variant(&processor, DerivativeKind::DocumentCopy, &self.config.document)?;
        let thumbnail =
            render_variant(&processor, DerivativeKind::Thumbnail, &self.config.thumbnail)?;

        let set = ImageDerivativeSet {
            content_hash,
            original_size: source.len() as u64,
            original_dimensions,
            source_format: processor.source_format().map(|format| format!("{format:?}")),
            thumbnail,
            gallery,
            document_copy,
        };

        info!(
            width = original_dimensions.0,
            height = original_dimensions.1,
            original_bytes = set.original_size,
            thumb_bytes = set.thumbnail.byte_size(),
            gallery_bytes = set.gallery.byte_size(),
            document_bytes = set.document_copy.byte_size(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Derivatives generated"
        );
        Ok(set)
    }

    /// Process several photos in parallel. Results keep the input order and
    /// one failure does not affect the others.
    pub fn process_batch(&self, sources: &[&[u8]]) -> Vec<Result<ImageDerivativeSet>> {
        sources.par_iter().map(|source| self.process(source)).collect()
    }
}

fn render_variant(
    processor: &ImageProcessor,
    kind: DerivativeKind,
    spec: &VariantSpec,
) -> Result<Derivative> {
    let fitted = processor.fit_within(spec.max_edge);
    let bytes = fitted.encode(spec.format, spec.quality)?;
    debug!(
        ?kind,
        width = fitted.width(),
        height = fitted.height(),
        bytes = bytes.len(),
        "Variant encoded"
    );
    Ok(Derivative {
        kind,
        format: spec.format,
        content_hash: hash_bytes(&bytes),
        width: fitted.width(),
        height: fitted.height(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use fleetdoc_core::error::FleetdocError;
    use fleetdoc_security::verify;
    use fleetdoc_storage::MemoryStore;
    use image::{DynamicImage, Rgb, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8])
        });
        ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(img))
            .to_jpeg_bytes(90)
            .unwrap()
    }

    #[test]
    fn variants_respect_caps() {
        let engine = DerivativeEngine::default();
        let source = jpeg(2000, 1500);
        let set = engine.process(&source).unwrap();

        assert_eq!(set.original_dimensions, (2000, 1500));
        assert!(verify(&source, &set.content_hash));
        assert!(set.thumbnail.long_edge() <= 150);
        assert!(set.gallery.long_edge() <= 1280);
        assert!(set.document_copy.long_edge() <= 960);
        assert_eq!(set.gallery.width, 1280);
        assert_eq!(set.thumbnail.format, DerivativeFormat::WebP);
        assert!(set.thumbnail.byte_size() < set.gallery.byte_size());

        for derivative in set.iter() {
            assert!(!derivative.bytes.is_empty());
            assert!(verify(&derivative.bytes, &derivative.content_hash));
            image::load_from_memory(&derivative.bytes).unwrap();
        }
    }

    #[test]
    fn small_sources_are_not_upscaled() {
        let set = DerivativeEngine::default().process(&jpeg(120, 80)).unwrap();
        assert_eq!((set.gallery.width, set.gallery.height), (120, 80));
        assert_eq!((set.thumbnail.width, set.thumbnail.height), (120, 80));
    }

    #[test]
    fn corrupted_input_is_unsupported() {
        let mut source = jpeg(64, 64);
        source.truncate(20);
        let err = DerivativeEngine::default().process(&source).unwrap_err();
        assert!(matches!(err, FleetdocError::UnsupportedMedia(_)));
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let good = jpeg(300, 200);
        let sources: Vec<&[u8]> = vec![good.as_slice(), b"not an image".as_slice(), good.as_slice()];
        let results = DerivativeEngine::default().process_batch(&sources);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn storage_keys_follow_layout() {
        let set = DerivativeEngine::default().process(&jpeg(200, 100)).unwrap();
        let store = MemoryStore::new();
        let keys = set.store(&store, "p1", "ph1").unwrap();
        assert_eq!(
            keys,
            vec![
                "protocols/p1/photos/thumb/ph1.webp",
                "protocols/p1/photos/gallery/ph1.jpg",
                "protocols/p1/photos/pdf/ph1.jpg",
            ]
        );
        assert_eq!(store.media_type(&keys[0]).as_deref(), Some("image/webp"));

        let entries = set.manifest_entries("p1", "ph1");
        assert_eq!(entries[1].name, keys[1]);
        assert_eq!(entries[1].content_hash, set.gallery.content_hash);
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(img))
            .to_png_bytes()
            .unwrap()
    }

    fn small_engine() -> DerivativeEngine {
        let mut config = DerivativeConfig::default();
        config.thumbnail.max_edge = 16;
        config.gallery.max_edge = 96;
        config.document.max_edge = 64;
        DerivativeEngine::new(config)
    }

    fn any_dimensions() -> impl Strategy<Value = (u32, u32)> {
        prop_oneof![
            (1u32..=240, 1u32..=240),
            (1u32..=240).prop_map(|n| (1, n)),
            (1u32..=240).prop_map(|n| (n, 1)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn derivatives_never_exceed_their_cap((width, height) in any_dimensions()) {
            let engine = small_engine();
            let set = engine.process(&png(width, height)).unwrap();
            prop_assert_eq!(set.original_dimensions, (width, height));

            let config = engine.config();
            for (derivative, cap) in [
                (&set.thumbnail, config.thumbnail.max_edge),
                (&set.gallery, config.gallery.max_edge),
                (&set.document_copy, config.document.max_edge),
            ] {
                prop_assert!(derivative.width >= 1 && derivative.height >= 1);
                prop_assert!(derivative.long_edge() <= cap);
                if width.max(height) <= cap {
                    prop_assert_eq!((derivative.width, derivative.height), (width, height));
                }
                let decoded = image::load_from_memory(&derivative.bytes).unwrap();
                prop_assert_eq!((decoded.width(), decoded.height()), (derivative.width, derivative.height));
            }
        }
    }
}
