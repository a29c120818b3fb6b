// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: bounded decoding, orientation correction, downscaling
// and encoding of in-memory photos using the `image` and `webp` crates.

use std::io::Cursor;

use fleetdoc_core::config::{DerivativeConfig, DerivativeFormat};
use fleetdoc_core::error::{FleetdocError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Limits, Rgb, RgbImage};
use tracing::{debug, instrument};

/// Decoder bounds applied before any pixel is allocated.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_edge: u32,
    pub max_alloc: u64,
}

impl From<&DerivativeConfig> for DecodeLimits {
    fn from(config: &DerivativeConfig) -> Self {
        Self {
            max_edge: config.max_source_edge,
            max_alloc: config.max_decode_alloc,
        }
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&DerivativeConfig::default())
    }
}

/// Image pipeline operating on a single decoded photo.
///
/// Transforming methods leave `self` untouched and return a new processor,
/// so one decode can feed several renditions and calls chain:
///
/// ```ignore
/// let jpeg = ImageProcessor::decode(bytes, limits)?
///     .fit_within(1280)
///     .encode(DerivativeFormat::Jpeg, 80)?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
    source_format: Option<ImageFormat>,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Decode encoded bytes (JPEG, PNG, WebP, ...) under `limits`, then apply
    /// the EXIF orientation so the pixels are upright.
    ///
    /// Anything that cannot be decoded, is zero-sized or exceeds the limits
    /// is `UnsupportedMedia`.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn decode(data: &[u8], limits: DecodeLimits) -> Result<Self> {
        if data.is_empty() {
            return Err(FleetdocError::UnsupportedMedia("empty input".into()));
        }

        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|err| FleetdocError::UnsupportedMedia(format!("unreadable input: {err}")))?;
        let source_format = reader.format();
        if source_format.is_none() {
            return Err(FleetdocError::UnsupportedMedia(
                "unrecognised image format".into(),
            ));
        }

        let mut decode_limits = Limits::default();
        decode_limits.max_image_width = Some(limits.max_edge);
        decode_limits.max_image_height = Some(limits.max_edge);
        decode_limits.max_alloc = Some(limits.max_alloc);
        reader.limits(decode_limits);

        let mut decoder = reader
            .into_decoder()
            .map_err(|err| FleetdocError::UnsupportedMedia(format!("failed to decode image: {err}")))?;
        let (width, height) = decoder.dimensions();
        if width == 0 || height == 0 {
            return Err(FleetdocError::UnsupportedMedia(format!(
                "image has zero size ({width}x{height})"
            )));
        }
        let orientation = decoder
            .orientation()
            .map_err(|err| FleetdocError::UnsupportedMedia(format!("bad orientation metadata: {err}")))?;

        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|err| FleetdocError::UnsupportedMedia(format!("failed to decode image: {err}")))?;
        image.apply_orientation(orientation);

        debug!(
            width = image.width(),
            height = image.height(),
            format = ?source_format,
            ?orientation,
            "Image decoded"
        );
        Ok(Self {
            image,
            source_format,
        })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            image,
            source_format: None,
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn long_edge(&self) -> u32 {
        self.width().max(self.height())
    }

    /// Format detected from the input bytes, if decoded from bytes.
    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Downscale proportionally so the long edge is at most `max_edge`.
    /// Smaller images are returned unchanged.
    pub fn fit_within(&self, max_edge: u32) -> Self {
        let max_edge = max_edge.max(1);
        let image = if self.long_edge() <= max_edge {
            self.image.clone()
        } else if max_edge <= 256 {
            // `thumbnail` trades filter quality for speed on tiny targets.
            self.image.thumbnail(max_edge, max_edge)
        } else {
            self.image.resize(max_edge, max_edge, FilterType::Lanczos3)
        };
        debug!(
            from_w = self.width(),
            from_h = self.height(),
            to_w = image.width(),
            to_h = image.height(),
            "Fitted image"
        );
        Self {
            image,
            source_format: self.source_format,
        }
    }

    // -- Output ---------------------------------------------------------------

    /// RGB pixels with any alpha composited onto white.
    pub fn to_rgb8_flattened(&self) -> RgbImage {
        if !self.image.color().has_alpha() {
            return self.image.to_rgb8();
        }
        let rgba = self.image.to_rgba8();
        RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let blend = |channel: u8| -> u8 {
                let alpha = a as u32;
                ((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
            };
            Rgb([blend(r), blend(g), blend(b)])
        })
    }

    /// Encode in `format` at `quality` (1-100; ignored for PNG).
    pub fn encode(&self, format: DerivativeFormat, quality: u8) -> Result<Vec<u8>> {
        match format {
            DerivativeFormat::Jpeg => self.to_jpeg_bytes(quality),
            DerivativeFormat::WebP => self.to_webp_bytes(quality),
            DerivativeFormat::Png => self.to_png_bytes(),
        }
    }

    /// Encode as baseline JPEG, alpha flattened onto white.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.to_rgb8_flattened();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|err| FleetdocError::ImageEncoding(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }

    /// Encode as lossy WebP. Transparent images keep their alpha channel.
    pub fn to_webp_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let quality = quality.clamp(1, 100) as f32;
        let (width, height) = (self.width(), self.height());
        let encoded = if self.image.color().has_alpha() {
            let rgba = self.image.to_rgba8();
            webp::Encoder::from_rgba(&rgba, width, height).encode_simple(false, quality)
        } else {
            let rgb = self.image.to_rgb8();
            webp::Encoder::from_rgb(&rgb, width, height).encode_simple(false, quality)
        };
        let memory = encoded
            .map_err(|err| FleetdocError::ImageEncoding(format!("WebP encoding failed: {err:?}")))?;
        Ok(memory.to_vec())
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|err| FleetdocError::ImageEncoding(format!("PNG encoding failed: {err}")))?;
        Ok(buffer)
    }
}
