//! Block measurement.
//!
//! The planner only needs one height per top-level block. Two measurers
//! provide them:
//!
//! - [`LayoutMeasurer`] lays the lesson out with the taffy-backed renderer
//!   and reads the real block heights.
//! - [`SyntheticMeasurer`] estimates heights from font metrics and text
//!   length, or takes them from caller-supplied values, without running
//!   layout at all.

use std::collections::HashMap;

use crate::error::Result;
use crate::fonts::{FontManager, DEFAULT_FAMILY};
use crate::layout::{render_lesson, BlockKind, Illustrations, RenderStyle};
use crate::lesson::LessonDocument;

/// Height of one top-level block, in logical px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredBlock {
    pub kind: BlockKind,
    pub height: f32,
}

pub trait BlockMeasurer {
    /// Heights of the lesson's top-level blocks at `width`, in render order.
    fn measure(
        &self,
        lesson: &LessonDocument,
        illustrations: &Illustrations,
        width: f32,
    ) -> Result<Vec<MeasuredBlock>>;
}

/// Measures by running the real layout.
pub struct LayoutMeasurer<'a> {
    pub fonts: &'a FontManager,
    pub style: RenderStyle,
}

impl BlockMeasurer for LayoutMeasurer<'_> {
    fn measure(
        &self,
        lesson: &LessonDocument,
        illustrations: &Illustrations,
        width: f32,
    ) -> Result<Vec<MeasuredBlock>> {
        let surface = render_lesson(lesson, illustrations, width, self.fonts, &self.style)?;
        Ok(surface
            .blocks
            .iter()
            .map(|b| MeasuredBlock {
                kind: b.kind,
                height: b.height,
            })
            .collect())
    }
}

/// Estimates heights without layout.
///
/// Text height is `ceil(text_width / column_width)` lines of the style's
/// line height; illustrations are scaled to the column like the renderer
/// does. Entries in `overrides` replace the estimate for their block.
pub struct SyntheticMeasurer<'a> {
    pub fonts: &'a FontManager,
    pub style: RenderStyle,
    pub overrides: HashMap<BlockKind, f32>,
}

impl<'a> SyntheticMeasurer<'a> {
    pub fn new(fonts: &'a FontManager, style: RenderStyle) -> Self {
        Self {
            fonts,
            style,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: BlockKind, height: f32) -> Self {
        self.overrides.insert(kind, height);
        self
    }

    fn text_height(&self, text: &str, font_size: f32, bold: bool, column: f32) -> f32 {
        let line_height = self.fonts.line_height_px(font_size, self.style.line_height);
        let lines: f32 = text
            .trim()
            .split('\n')
            .map(|para| {
                let w = self
                    .fonts
                    .measure_text_width(para.trim(), font_size, bold, DEFAULT_FAMILY);
                (w / column).ceil().max(1.0)
            })
            .sum();
        lines * line_height
    }
}

impl BlockMeasurer for SyntheticMeasurer<'_> {
    fn measure(
        &self,
        lesson: &LessonDocument,
        illustrations: &Illustrations,
        width: f32,
    ) -> Result<Vec<MeasuredBlock>> {
        let s = &self.style;
        let column = (width - 2.0 * s.padding_x).max(1.0);
        let mut blocks = Vec::new();

        if !lesson.title.trim().is_empty() {
            let height = s.padding_top
                + self.text_height(&lesson.title, s.title_size, true, column)
                + s.block_spacing;
            blocks.push(MeasuredBlock {
                kind: BlockKind::Title,
                height,
            });
        }

        for (kind, section) in lesson.sections() {
            let pixels = illustrations.get(&kind);
            let has_heading = !section.heading.trim().is_empty();
            let has_body = !section.body.trim().is_empty();
            if !has_heading && !has_body && pixels.is_none() {
                continue;
            }

            let mut height = if blocks.is_empty() { s.padding_top } else { 0.0 };
            if has_heading {
                height += self.text_height(&section.heading, s.heading_size, true, column)
                    + 2.0 * s.heading_gap
                    + s.rule_thickness;
            }
            if has_body {
                height += self.text_height(&section.body, s.body_size, false, column);
                if pixels.is_some() {
                    height += s.image_gap;
                }
            }
            if let Some(img) = pixels {
                if img.width() > 0 {
                    let natural = column * img.height() as f32 / img.width() as f32;
                    height += natural.min(s.max_illustration_height);
                }
            }
            height += s.block_spacing;

            blocks.push(MeasuredBlock {
                kind: BlockKind::Section(kind),
                height,
            });
        }

        for block in &mut blocks {
            if let Some(h) = self.overrides.get(&block.kind) {
                block.height = *h;
            }
        }
        Ok(blocks)
    }
}
