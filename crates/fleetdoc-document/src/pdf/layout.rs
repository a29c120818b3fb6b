// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page layout: a top-down cursor over `printpdf` 0.8 operation lists.
//
// printpdf 0.8 is data-oriented: each page is a `Vec<Op>`. The cursor owns
// one such list per page and starts a new one whenever a block would cross
// the bottom margin, so the number of lists is the page count.

use fleetdoc_core::config::DocumentConfig;
use printpdf::{Line, LinePoint, Mm, Op, Point, Pt, XObjectId, XObjectTransform};
use tracing::debug;

use super::fonts::FontFace;

/// Space reserved above the bottom margin for the footer.
pub const FOOTER_HEIGHT_PT: f32 = 24.0;

/// Average glyph advance as a fraction of the font size. Close enough for
/// Helvetica and the usual sans-serif candidates to wrap conservatively.
const AVG_GLYPH_WIDTH: f32 = 0.52;

#[derive(Debug, Clone, Copy)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
}

impl PageGeometry {
    pub fn from_config(config: &DocumentConfig) -> Self {
        let (w_mm, h_mm) = config.paper_size.dimensions_mm();
        Self {
            width_mm: w_mm as f32,
            height_mm: h_mm as f32,
            width_pt: Mm(w_mm as f32).into_pt().0,
            height_pt: Mm(h_mm as f32).into_pt().0,
            margin_pt: config.margin_pt,
        }
    }

    pub fn page_size_mm(&self) -> (Mm, Mm) {
        (Mm(self.width_mm), Mm(self.height_mm))
    }

    pub fn content_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }

    /// Highest baseline on a page.
    pub fn top(&self) -> f32 {
        self.height_pt - self.margin_pt
    }

    /// Lowest point content may reach; the footer lives below it.
    pub fn bottom(&self) -> f32 {
        self.margin_pt + FOOTER_HEIGHT_PT
    }

    pub fn content_height(&self) -> f32 {
        self.top() - self.bottom()
    }
}

/// Running vertical cursor. `y` is the top of the next block, in points
/// from the bottom edge.
pub struct LayoutCursor {
    geometry: PageGeometry,
    pages: Vec<Vec<Op>>,
    y: f32,
}

impl LayoutCursor {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![Vec::new()],
            y: geometry.top(),
        }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn remaining(&self) -> f32 {
        self.y - self.geometry.bottom()
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = self.geometry.top();
        debug!(page = self.pages.len(), "Page break");
    }

    /// Start a new page unless `height` still fits. Returns whether a page
    /// break happened. Blocks taller than a whole page are placed anyway.
    pub fn ensure_space(&mut self, height: f32) -> bool {
        if height > self.remaining() && self.y < self.geometry.top() {
            self.new_page();
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self, dy: f32) {
        self.y -= dy;
    }

    fn ops(&mut self) -> &mut Vec<Op> {
        // `pages` always holds at least the first page.
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Write one line of text with its baseline at `baseline`, without
    /// moving the cursor.
    pub fn text_at(&mut self, face: &FontFace, size: f32, x: f32, baseline: f32, text: String) {
        let ops = self.ops();
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(x),
                y: Pt(baseline),
            },
        });
        ops.extend(face.text_ops(size, text));
        ops.push(Op::EndTextSection);
    }

    /// Write one line at the cursor and move below it.
    pub fn line(&mut self, face: &FontFace, size: f32, indent: f32, text: String) {
        let line_height = line_height(size);
        self.ensure_space(line_height);
        let baseline = self.y - size;
        let x = self.geometry.margin_pt + indent;
        self.text_at(face, size, x, baseline, text);
        self.y -= line_height;
    }

    /// Word-wrapped paragraph. Each line paginates on its own.
    pub fn paragraph(&mut self, face: &FontFace, size: f32, indent: f32, text: &str) {
        let width = self.geometry.content_width() - indent;
        for line in wrap_text(text, chars_per_line(width, size)) {
            self.line(face, size, indent, line);
        }
    }

    /// Thin horizontal rule across the content width.
    pub fn rule(&mut self) {
        self.ensure_space(8.0);
        let y = self.y - 4.0;
        let left = self.geometry.margin_pt;
        let right = self.geometry.width_pt - self.geometry.margin_pt;
        self.ops().push(Op::SetOutlineThickness { pt: Pt(0.5) });
        self.ops().push(Op::DrawLine {
            line: Line {
                points: vec![line_point(left, y), line_point(right, y)],
                is_closed: false,
            },
        });
        self.y -= 8.0;
    }

    /// Outline of a rectangle whose top-left corner is at (`x`, `top`).
    pub fn frame(&mut self, x: f32, top: f32, width: f32, height: f32) {
        let bottom = top - height;
        self.ops().push(Op::SetOutlineThickness { pt: Pt(0.75) });
        self.ops().push(Op::DrawLine {
            line: Line {
                points: vec![
                    line_point(x, top),
                    line_point(x + width, top),
                    line_point(x + width, bottom),
                    line_point(x, bottom),
                ],
                is_closed: true,
            },
        });
    }

    /// Place an image so that it fits the box with top-left (`x`, `top`),
    /// centred, aspect preserved.
    #[allow(clippy::too_many_arguments)]
    pub fn image(
        &mut self,
        id: XObjectId,
        pixel_width: u32,
        pixel_height: u32,
        dpi: f32,
        x: f32,
        top: f32,
        box_width: f32,
        box_height: f32,
    ) {
        let native_w = pixel_width.max(1) as f32 / dpi * 72.0;
        let native_h = pixel_height.max(1) as f32 / dpi * 72.0;
        let scale = (box_width / native_w).min(box_height / native_h);
        let rendered_w = native_w * scale;
        let rendered_h = native_h * scale;
        let x_offset = x + (box_width - rendered_w) / 2.0;
        let y_offset = top - box_height + (box_height - rendered_h) / 2.0;

        self.ops().push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(x_offset)),
                translate_y: Some(Pt(y_offset)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(dpi),
                rotate: None,
            },
        });
    }

    /// Append operations to an already-finished page (footers).
    pub fn push_to_page(&mut self, page: usize, ops: Vec<Op>) {
        if let Some(target) = self.pages.get_mut(page) {
            target.extend(ops);
        }
    }

    pub fn into_pages(self) -> Vec<Vec<Op>> {
        self.pages
    }
}

fn line_point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

pub fn line_height(size: f32) -> f32 {
    size * 1.35
}

/// Estimated characters that fit in `width` points at `size`.
pub fn chars_per_line(width: f32, size: f32) -> usize {
    ((width / (AVG_GLYPH_WIDTH * size)).floor() as usize).max(1)
}

/// Estimated rendered width of `text` at `size`.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * AVG_GLYPH_WIDTH * size
}

// -- Text wrapping helper -----------------------------------------------------

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then word-wraps each paragraph. Words
/// longer than `max_width` are broken on character boundaries.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut result = Vec::new();

    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            result.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        let mut current_len = 0usize;

        for word in words {
            let word_len = word.chars().count();
            if word_len > max_width {
                if !current_line.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                }
                let chars: Vec<char> = word.chars().collect();
                let mut chunks = chars.chunks(max_width).peekable();
                while let Some(chunk) = chunks.next() {
                    if chunks.peek().is_some() {
                        result.push(chunk.iter().collect());
                    } else {
                        current_line = chunk.iter().collect();
                        current_len = chunk.len();
                    }
                }
            } else if current_line.is_empty() {
                current_line.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
                current_len += 1 + word_len;
            } else {
                result.push(std::mem::replace(&mut current_line, word.to_owned()));
                current_len = word_len;
            }
        }

        if !current_line.is_empty() {
            result.push(current_line);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdoc_core::PaperSize;

    fn a4() -> PageGeometry {
        PageGeometry::from_config(&DocumentConfig {
            paper_size: PaperSize::A4,
            ..DocumentConfig::default()
        })
    }

    #[test]
    fn a4_geometry() {
        let geometry = a4();
        assert!((geometry.width_pt - 595.3).abs() < 1.0);
        assert!((geometry.height_pt - 841.9).abs() < 1.0);
        assert!((geometry.content_width() - 495.3).abs() < 1.0);
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn wrap_breaks_long_multibyte_words() {
        let lines = wrap_text("ščťžýáíéščťžýáíé", 5);
        assert_eq!(lines, vec!["ščťžý", "áíéšč", "ťžýáí", "é"]);
    }

    #[test]
    fn wrap_keeps_blank_lines() {
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn ensure_space_breaks_pages() {
        let mut cursor = LayoutCursor::new(a4());
        assert!(!cursor.ensure_space(100.0));
        cursor.advance(cursor.remaining() - 10.0);
        assert!(cursor.ensure_space(100.0));
        assert_eq!(cursor.page_count(), 2);
        assert_eq!(cursor.y(), cursor.geometry().top());
    }

    #[test]
    fn oversized_block_does_not_loop() {
        let mut cursor = LayoutCursor::new(a4());
        assert!(!cursor.ensure_space(10_000.0));
        assert_eq!(cursor.page_count(), 1);
    }
}
