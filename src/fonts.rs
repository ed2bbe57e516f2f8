//! Font loading, text measurement and glyph outlines using `ttf-parser`.
//!
//! Without a loaded TTF the manager falls back to Helvetica-like synthetic
//! metrics, which is enough to measure and wrap text but not to paint
//! glyphs. Load a real face with [`FontManager::load_font`] to get outlines.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Family name used by the lesson renderer.
pub const DEFAULT_FAMILY: &str = "Sans";

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
        }
    }
}

/// A straight segment of a flattened glyph outline, in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Manages loaded fonts.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    default_key: FontKey,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            default_key: FontKey::new(DEFAULT_FAMILY, false),
        }
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, bytes: Vec<u8>) -> Result<()> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| Error::Font(format!("failed to parse font: {e}")))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };

        let key = FontKey::new(family, bold);
        // Real faces replace the synthetic default.
        if !self.has_real_fonts() {
            self.fonts.retain(|_, d| !d.bytes.is_empty());
            self.default_key = key.clone();
        }
        self.fonts.insert(key, data);
        Ok(())
    }

    /// Register synthetic Helvetica-like metrics when nothing is loaded.
    pub fn ensure_default(&mut self) {
        if !self.fonts.is_empty() {
            return;
        }
        for bold in [false, true] {
            self.fonts.insert(
                FontKey::new(DEFAULT_FAMILY, bold),
                FontData {
                    bytes: Vec::new(),
                    units_per_em: 1000.0,
                    ascender: 750.0,
                    descender: -250.0,
                    line_gap: 0.0,
                },
            );
        }
        self.default_key = FontKey::new(DEFAULT_FAMILY, false);
    }

    /// Get font data for a key, falling back to the regular weight of the
    /// family and then to the default face.
    pub fn get(&self, key: &FontKey) -> Option<&FontData> {
        self.fonts
            .get(key)
            .or_else(|| self.fonts.get(&FontKey::new(&key.family, false)))
            .or_else(|| self.fonts.get(&self.default_key))
    }

    /// Measure the width of a string at a given font size (in px).
    /// With real font bytes we sum glyph advances; otherwise an average
    /// character width of 0.5 × font_size (0.55 for bold) is used.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool, family: &str) -> f32 {
        let heuristic = |text: &str| {
            let avg = if bold { 0.55 } else { 0.5 };
            text.chars().count() as f32 * font_size * avg
        };

        let data = match self.get(&FontKey::new(family, bold)) {
            Some(d) if !d.bytes.is_empty() => d,
            _ => return heuristic(text),
        };

        match ttf_parser::Face::parse(&data.bytes, 0) {
            Ok(face) => {
                let scale = font_size / data.units_per_em;
                text.chars()
                    .map(|ch| match face.glyph_index(ch) {
                        Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                        None => font_size * 0.5,
                    })
                    .sum()
            }
            Err(_) => heuristic(text),
        }
    }

    /// Line height in px.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Ascender in px for the given face.
    pub fn ascender_px(&self, font_size: f32, bold: bool, family: &str) -> f32 {
        match self.get(&FontKey::new(family, bold)) {
            Some(data) => data.ascender * font_size / data.units_per_em,
            None => font_size * 0.75,
        }
    }

    /// Check if real font bytes are loaded for the default font.
    pub fn has_real_fonts(&self) -> bool {
        self.fonts
            .get(&self.default_key)
            .map(|d| !d.bytes.is_empty())
            .unwrap_or(false)
    }

    /// Flatten the outlines of `text` into line segments, positioned with the
    /// pen starting at (`x`, `baseline`) in a y-down pixel space.
    ///
    /// Returns `None` when only synthetic metrics are available.
    pub fn outline_text(
        &self,
        text: &str,
        font_size: f32,
        bold: bool,
        family: &str,
        x: f32,
        baseline: f32,
    ) -> Option<Vec<Segment>> {
        let data = self.get(&FontKey::new(family, bold))?;
        if data.bytes.is_empty() {
            return None;
        }
        let face = ttf_parser::Face::parse(&data.bytes, 0).ok()?;
        let scale = font_size / data.units_per_em;

        let mut builder = OutlineFlattener {
            segments: Vec::new(),
            origin_x: x,
            baseline,
            scale,
            start: (0.0, 0.0),
            pen: (0.0, 0.0),
        };
        for ch in text.chars() {
            match face.glyph_index(ch) {
                Some(gid) => {
                    face.outline_glyph(gid, &mut builder);
                    builder.origin_x += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                }
                None => builder.origin_x += font_size * 0.5,
            }
        }
        Some(builder.segments)
    }
}

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

/// Curve subdivisions used when flattening quadratic and cubic segments.
const CURVE_STEPS: usize = 8;

struct OutlineFlattener {
    segments: Vec<Segment>,
    origin_x: f32,
    baseline: f32,
    scale: f32,
    start: (f32, f32),
    pen: (f32, f32),
}

impl OutlineFlattener {
    /// Font units (y-up) → pixel space (y-down).
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }

    fn push_to(&mut self, to: (f32, f32)) {
        self.segments.push(Segment {
            x0: self.pen.0,
            y0: self.pen.1,
            x1: to.0,
            y1: to.1,
        });
        self.pen = to;
    }
}

impl ttf_parser::OutlineBuilder for OutlineFlattener {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.start = p;
        self.pen = p;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.push_to(p);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let p0 = self.pen;
        let c = self.map(x1, y1);
        let p1 = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let px = mt * mt * p0.0 + 2.0 * mt * t * c.0 + t * t * p1.0;
            let py = mt * mt * p0.1 + 2.0 * mt * t * c.1 + t * t * p1.1;
            self.push_to((px, py));
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let p0 = self.pen;
        let c1 = self.map(x1, y1);
        let c2 = self.map(x2, y2);
        let p1 = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let a = mt * mt * mt;
            let b = 3.0 * mt * mt * t;
            let c = 3.0 * mt * t * t;
            let d = t * t * t;
            let px = a * p0.0 + b * c1.0 + c * c2.0 + d * p1.0;
            let py = a * p0.1 + b * c1.1 + c * c2.1 + d * p1.1;
            self.push_to((px, py));
        }
    }

    fn close(&mut self) {
        if self.pen != self.start {
            let start = self.start;
            self.push_to(start);
        }
    }
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    // Hard line breaks start new paragraphs.
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current_line, word)
            };
            let w = fonts.measure_text_width(&candidate, font_size, bold, family);
            if w > max_width && !current_line.is_empty() {
                lines.push(current_line);
                current_line = word.to_string();
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 16.0, false, DEFAULT_FAMILY);
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        let bold = mgr.measure_text_width("Hello", 16.0, true, DEFAULT_FAMILY);
        assert!((bold - 44.0).abs() < 0.1);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, DEFAULT_FAMILY, 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn wrap_keeps_hard_breaks() {
        let mgr = FontManager::default();
        let lines = wrap_text("Prvi red\n\nTreći", 16.0, false, DEFAULT_FAMILY, 500.0, &mgr);
        assert_eq!(lines, vec!["Prvi red", "", "Treći"]);
    }

    #[test]
    fn synthetic_metrics_have_no_outlines() {
        let mgr = FontManager::default();
        assert!(!mgr.has_real_fonts());
        assert!(mgr
            .outline_text("abc", 16.0, false, DEFAULT_FAMILY, 0.0, 12.0)
            .is_none());
    }

    #[test]
    fn rejects_garbage_font_bytes() {
        let mut mgr = FontManager::default();
        let err = mgr.load_font(DEFAULT_FAMILY, false, vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Font(_)));
        assert!(!mgr.has_real_fonts());
    }
}
