// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font resolution for protocol documents.
//
// Protocols are written in languages with diacritics, so an embedded
// TrueType/OpenType face is preferred. Without one the built-in Helvetica
// is used and text is folded to what its encoding can show.

use std::path::{Path, PathBuf};

use printpdf::{BuiltinFont, FontId, Op, ParsedFont, PdfDocument, PdfWarnMsg, Pt, TextItem};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A face that text can be written with.
#[derive(Debug, Clone)]
pub enum FontFace {
    Embedded(FontId),
    Builtin(BuiltinFont),
}

impl FontFace {
    /// Font selection and text-show operations. Must be emitted inside a
    /// text section.
    pub fn text_ops(&self, size: f32, text: String) -> Vec<Op> {
        match self {
            Self::Embedded(id) => vec![
                Op::SetFontSize {
                    size: Pt(size),
                    font: id.clone(),
                },
                Op::WriteText {
                    items: vec![TextItem::Text(text)],
                    font: id.clone(),
                },
            ],
            Self::Builtin(font) => vec![
                Op::SetFontSizeBuiltinFont {
                    size: Pt(size),
                    font: *font,
                },
                Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(text)],
                    font: *font,
                },
            ],
        }
    }
}

/// Regular and bold faces for one document.
#[derive(Debug, Clone)]
pub struct FontSet {
    pub regular: FontFace,
    pub bold: FontFace,
    /// Path of the embedded regular face, `None` on the built-in fallback.
    pub source: Option<PathBuf>,
}

impl FontSet {
    /// Built-in Helvetica pair.
    pub fn builtin() -> Self {
        Self {
            regular: FontFace::Builtin(BuiltinFont::Helvetica),
            bold: FontFace::Builtin(BuiltinFont::HelveticaBold),
            source: None,
        }
    }

    /// Embed the first loadable regular candidate and the first loadable
    /// bold candidate. Bold falls back to the regular face; if no regular
    /// face loads the built-in pair is returned.
    pub fn resolve(doc: &mut PdfDocument, regular: &[PathBuf], bold: &[PathBuf]) -> Self {
        let Some((regular_path, regular_font)) = first_loadable(regular) else {
            warn!(
                candidates = regular.len(),
                "No embeddable font found, falling back to built-in Helvetica"
            );
            return Self::builtin();
        };
        let regular_id = doc.add_font(&regular_font);

        let bold_face = match first_loadable(bold) {
            Some((bold_path, bold_font)) => {
                debug!(path = %bold_path.display(), "Bold font embedded");
                FontFace::Embedded(doc.add_font(&bold_font))
            }
            None => {
                debug!("No bold font found, using regular face for headings");
                FontFace::Embedded(regular_id.clone())
            }
        };

        debug!(path = %regular_path.display(), "Regular font embedded");
        Self {
            regular: FontFace::Embedded(regular_id),
            bold: bold_face,
            source: Some(regular_path),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source.is_none()
    }

    /// Text ready for this font set: unchanged for embedded faces, folded
    /// for the built-in one.
    pub fn prepare(&self, text: &str) -> String {
        if self.is_fallback() {
            fold_to_latin1(text)
        } else {
            text.to_owned()
        }
    }
}

fn first_loadable(candidates: &[PathBuf]) -> Option<(PathBuf, ParsedFont)> {
    candidates
        .iter()
        .find_map(|path| load_font(path).map(|font| (path.clone(), font)))
}

fn load_font(path: &Path) -> Option<ParsedFont> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(path = %path.display(), %err, "Font candidate not readable");
            return None;
        }
    };
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let parsed = ParsedFont::from_bytes(&bytes, 0, &mut warnings);
    if parsed.is_none() {
        warn!(path = %path.display(), "Font candidate could not be parsed");
    }
    parsed
}

/// Reduce `text` to Latin-1 for the built-in font.
///
/// Characters outside Latin-1 lose their diacritics ("č" becomes "c");
/// typographic punctuation becomes its ASCII form; anything else is `?`.
pub fn fold_to_latin1(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.nfc() {
        if (c as u32) <= 0xFF {
            folded.push(c);
            continue;
        }
        match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => folded.push('-'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' => folded.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => folded.push('"'),
            '\u{2026}' => folded.push_str("..."),
            '\u{20AC}' => folded.push_str("EUR"),
            '\u{2022}' => folded.push('\u{B7}'),
            _ => {
                let base: String = std::iter::once(c)
                    .nfd()
                    .filter(|d| !is_combining_mark(*d))
                    .collect();
                if !base.is_empty() && base.chars().all(|b| (b as u32) <= 0xFF) {
                    folded.push_str(&base);
                } else {
                    folded.push('?');
                }
            }
        }
    }
    folded
}
