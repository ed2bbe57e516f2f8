//! Content renderer – lays a lesson out into an off-screen render surface.
//!
//! The surface mirrors what the browser view of a lesson looks like: a title
//! block followed by one block per section (heading, rule, body text and an
//! optional illustration), stacked in a fixed-width column. Taffy computes
//! the stacking; text is pre-wrapped with [`wrap_text`] so every leaf has a
//! known intrinsic size.
//!
//! Block spacing is carried as padding *inside* each block, so the measured
//! block heights tile the surface exactly: the top of block `i` equals the
//! sum of the heights of blocks `0..i`. The pagination planner relies on
//! this.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use taffy::prelude::*;

use crate::error::{Error, Result};
use crate::fonts::{wrap_text, FontManager, DEFAULT_FAMILY};
use crate::lesson::{LessonDocument, SectionKind};

/// Visual parameters of the lesson view, in logical px.
#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub padding_x: f32,
    pub padding_top: f32,
    pub block_spacing: f32,
    pub title_size: f32,
    pub heading_size: f32,
    pub body_size: f32,
    pub line_height: f32,
    pub heading_gap: f32,
    pub rule_thickness: f32,
    pub image_gap: f32,
    pub max_illustration_height: f32,
    pub title_color: [u8; 3],
    pub heading_color: [u8; 3],
    pub body_color: [u8; 3],
    pub rule_color: [u8; 3],
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            padding_x: 40.0,
            padding_top: 40.0,
            block_spacing: 24.0,
            title_size: 30.0,
            heading_size: 20.0,
            body_size: 15.0,
            line_height: 1.5,
            heading_gap: 8.0,
            rule_thickness: 2.0,
            image_gap: 14.0,
            max_illustration_height: 420.0,
            title_color: [0x1a, 0x36, 0x5d],
            heading_color: [0x2b, 0x6c, 0xb0],
            body_color: [0x2d, 0x37, 0x48],
            rule_color: [0xcb, 0xd5, 0xe0],
        }
    }
}

/// What a top-level block of the surface represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "block", content = "section", rename_all = "lowercase")]
pub enum BlockKind {
    Title,
    Section(SectionKind),
}

/// Pre-wrapped text positioned relative to its block.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub lines: Vec<String>,
    pub font_size: f32,
    pub bold: bool,
    pub line_height: f32,
    pub color: [u8; 3],
}

/// A paintable item positioned relative to its block's top-left corner.
#[derive(Debug, Clone)]
pub enum Item {
    Text(TextRun),
    Rule {
        x: f32,
        y: f32,
        width: f32,
        thickness: f32,
        color: [u8; 3],
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pixels: Arc<RgbImage>,
    },
}

/// One top-level block of the surface.
#[derive(Debug, Clone)]
pub struct SurfaceBlock {
    pub kind: BlockKind,
    /// Natural top in surface coordinates, before any pushdown.
    pub y: f32,
    pub height: f32,
    /// Pushdown applied by the pagination planner.
    pub extra_top_margin: f32,
    pub items: Vec<Item>,
}

/// The laid-out lesson, ready to be measured, adjusted and rasterized.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    pub width: f32,
    pub blocks: Vec<SurfaceBlock>,
}

impl RenderSurface {
    /// Heights of the top-level blocks, in order.
    pub fn block_heights(&self) -> Vec<f32> {
        self.blocks.iter().map(|b| b.height).collect()
    }

    /// Apply pushdown margins (one per block, as returned by the planner).
    pub fn apply_margins(&mut self, margins: &[f32]) -> Result<()> {
        if margins.len() != self.blocks.len() {
            return Err(Error::Raster(format!(
                "{} margins for {} blocks",
                margins.len(),
                self.blocks.len()
            )));
        }
        for (block, margin) in self.blocks.iter_mut().zip(margins) {
            block.extra_top_margin = *margin;
        }
        Ok(())
    }

    /// Top of block `index` after pushdowns.
    pub fn adjusted_top(&self, index: usize) -> f32 {
        let pushed: f32 = self.blocks[..=index]
            .iter()
            .map(|b| b.extra_top_margin)
            .sum();
        self.blocks[index].y + pushed
    }

    /// Total content height including pushdowns.
    pub fn total_height(&self) -> f32 {
        let natural = self
            .blocks
            .last()
            .map(|b| b.y + b.height)
            .unwrap_or(0.0);
        natural + self.blocks.iter().map(|b| b.extra_top_margin).sum::<f32>()
    }
}

/// Decoded illustrations, keyed by the section they belong to.
pub type Illustrations = HashMap<SectionKind, Arc<RgbImage>>;

/// What a taffy leaf stands for, resolved into an [`Item`] after layout.
enum LeafContent {
    Text {
        lines: Vec<String>,
        font_size: f32,
        bold: bool,
        line_height: f32,
        color: [u8; 3],
    },
    Rule { color: [u8; 3] },
    Image(Arc<RgbImage>),
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    style: &'a RenderStyle,
    leaf_content: HashMap<NodeId, LeafContent>,
    content_width: f32,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, style: &'a RenderStyle, content_width: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            style,
            leaf_content: HashMap::new(),
            content_width,
        }
    }

    fn text_leaf(
        &mut self,
        text: &str,
        font_size: f32,
        bold: bool,
        color: [u8; 3],
        margin_bottom: f32,
    ) -> Result<NodeId> {
        let line_height = self.fonts.line_height_px(font_size, self.style.line_height);
        let lines = wrap_text(
            text.trim(),
            font_size,
            bold,
            DEFAULT_FAMILY,
            self.content_width,
            self.fonts,
        );
        let height = lines.len() as f32 * line_height;

        let node = self.leaf(self.content_width, height, margin_bottom)?;
        self.leaf_content.insert(
            node,
            LeafContent::Text {
                lines,
                font_size,
                bold,
                line_height,
                color,
            },
        );
        Ok(node)
    }

    fn rule_leaf(&mut self, margin_bottom: f32) -> Result<NodeId> {
        let node = self.leaf(self.content_width, self.style.rule_thickness, margin_bottom)?;
        self.leaf_content.insert(
            node,
            LeafContent::Rule {
                color: self.style.rule_color,
            },
        );
        Ok(node)
    }

    /// Scale the illustration to the column width, capped in height.
    fn image_leaf(&mut self, pixels: Arc<RgbImage>) -> Result<Option<NodeId>> {
        let (px_w, px_h) = (pixels.width() as f32, pixels.height() as f32);
        if px_w == 0.0 || px_h == 0.0 {
            return Ok(None);
        }
        let mut width = self.content_width;
        let mut height = width * px_h / px_w;
        if height > self.style.max_illustration_height {
            height = self.style.max_illustration_height;
            width = height * px_w / px_h;
        }
        let node = self.leaf(width, height, 0.0)?;
        self.leaf_content.insert(node, LeafContent::Image(pixels));
        Ok(Some(node))
    }

    fn leaf(&mut self, width: f32, height: f32, margin_bottom: f32) -> Result<NodeId> {
        let style = Style {
            size: Size {
                width: Dimension::Length(width),
                height: Dimension::Length(height),
            },
            flex_shrink: 0.0,
            margin: Rect {
                top: LengthPercentageAuto::Length(0.0),
                right: LengthPercentageAuto::Length(0.0),
                bottom: LengthPercentageAuto::Length(margin_bottom),
                left: LengthPercentageAuto::Length(0.0),
            },
            ..Default::default()
        };
        self.taffy.new_leaf(style).map_err(layout_err)
    }

    /// A top-level block: a column with the inter-block spacing as bottom
    /// padding, so measured heights include it.
    fn block(&mut self, children: &[NodeId], padding_top: f32) -> Result<NodeId> {
        let style = Style {
            display: taffy::Display::Flex,
            flex_direction: taffy::FlexDirection::Column,
            align_items: Some(taffy::AlignItems::Center),
            flex_shrink: 0.0,
            size: Size {
                width: Dimension::Percent(1.0),
                height: Dimension::Auto,
            },
            padding: Rect {
                top: LengthPercentage::Length(padding_top),
                right: LengthPercentage::Length(self.style.padding_x),
                bottom: LengthPercentage::Length(self.style.block_spacing),
                left: LengthPercentage::Length(self.style.padding_x),
            },
            ..Default::default()
        };
        self.taffy
            .new_with_children(style, children)
            .map_err(layout_err)
    }

    fn extract_items(&self, block: NodeId) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for child in self.taffy.children(block).map_err(layout_err)? {
            let layout = self.taffy.layout(child).map_err(layout_err)?;
            let (x, y) = (layout.location.x, layout.location.y);
            let (width, height) = (layout.size.width, layout.size.height);
            let item = match self.leaf_content.get(&child) {
                Some(LeafContent::Text {
                    lines,
                    font_size,
                    bold,
                    line_height,
                    color,
                }) => Item::Text(TextRun {
                    x,
                    y,
                    lines: lines.clone(),
                    font_size: *font_size,
                    bold: *bold,
                    line_height: *line_height,
                    color: *color,
                }),
                Some(LeafContent::Rule { color }) => Item::Rule {
                    x,
                    y,
                    width,
                    thickness: height,
                    color: *color,
                },
                Some(LeafContent::Image(pixels)) => Item::Image {
                    x,
                    y,
                    width,
                    height,
                    pixels: Arc::clone(pixels),
                },
                None => continue,
            };
            items.push(item);
        }
        Ok(items)
    }
}

fn layout_err(e: taffy::TaffyError) -> Error {
    Error::Raster(format!("layout failed: {e}"))
}

/// Lay a lesson out at `width` logical px.
///
/// Sections with neither heading, body nor illustration are omitted, as is
/// an empty title. Illustrations missing from `illustrations` (not loaded,
/// failed or not settled in time) are simply not drawn.
pub fn render_lesson(
    lesson: &LessonDocument,
    illustrations: &Illustrations,
    width: f32,
    fonts: &FontManager,
    style: &RenderStyle,
) -> Result<RenderSurface> {
    let content_width = (width - 2.0 * style.padding_x).max(1.0);
    let mut builder = LayoutBuilder::new(fonts, style, content_width);

    let mut block_ids: Vec<(BlockKind, NodeId)> = Vec::new();

    if !lesson.title.trim().is_empty() {
        let title = builder.text_leaf(&lesson.title, style.title_size, true, style.title_color, 0.0)?;
        let block = builder.block(&[title], style.padding_top)?;
        block_ids.push((BlockKind::Title, block));
    }

    for (kind, section) in lesson.sections() {
        let pixels = illustrations.get(&kind).cloned();
        if section.heading.trim().is_empty() && section.body.trim().is_empty() && pixels.is_none() {
            continue;
        }

        let mut children = Vec::new();
        if !section.heading.trim().is_empty() {
            children.push(builder.text_leaf(
                &section.heading,
                style.heading_size,
                true,
                style.heading_color,
                style.heading_gap,
            )?);
            children.push(builder.rule_leaf(style.heading_gap)?);
        }
        if !section.body.trim().is_empty() {
            let gap = if pixels.is_some() { style.image_gap } else { 0.0 };
            children.push(builder.text_leaf(
                &section.body,
                style.body_size,
                false,
                style.body_color,
                gap,
            )?);
        }
        if let Some(pixels) = pixels {
            if let Some(node) = builder.image_leaf(pixels)? {
                children.push(node);
            }
        }

        // Without a title the first section carries the top padding.
        let padding_top = if block_ids.is_empty() { style.padding_top } else { 0.0 };
        let block = builder.block(&children, padding_top)?;
        block_ids.push((BlockKind::Section(kind), block));
    }

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: Dimension::Length(width),
            height: Dimension::Auto,
        },
        ..Default::default()
    };
    let ids: Vec<NodeId> = block_ids.iter().map(|(_, id)| *id).collect();
    let root = builder
        .taffy
        .new_with_children(root_style, &ids)
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    let mut blocks = Vec::with_capacity(block_ids.len());
    for (kind, id) in block_ids {
        let layout = builder.taffy.layout(id).map_err(layout_err)?;
        blocks.push(SurfaceBlock {
            kind,
            y: layout.location.y,
            height: layout.size.height,
            extra_top_margin: 0.0,
            items: builder.extract_items(id)?,
        });
    }

    log::debug!(
        "rendered lesson '{}' into {} blocks at {}px",
        lesson.title,
        blocks.len(),
        width
    );
    Ok(RenderSurface { width, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;

    fn render(lesson: &LessonDocument, illustrations: &Illustrations) -> RenderSurface {
        render_lesson(
            lesson,
            illustrations,
            800.0,
            &FontManager::default(),
            &RenderStyle::default(),
        )
        .unwrap()
    }

    #[test]
    fn title_and_five_sections() {
        let surface = render(&samples::heart_lesson(), &Illustrations::new());
        assert_eq!(surface.blocks.len(), 6);
        assert_eq!(surface.blocks[0].kind, BlockKind::Title);
        assert_eq!(
            surface.blocks[5].kind,
            BlockKind::Section(SectionKind::Aftercare)
        );
        assert!(surface.blocks.iter().all(|b| b.height > 0.0));
    }

    #[test]
    fn block_heights_tile_the_surface() {
        let surface = render(&samples::heart_lesson(), &Illustrations::new());
        let mut cursor = 0.0f32;
        for block in &surface.blocks {
            assert!((block.y - cursor).abs() < 0.01, "{} vs {}", block.y, cursor);
            cursor += block.height;
        }
        assert!((surface.total_height() - cursor).abs() < 0.01);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut lesson = samples::heart_lesson();
        lesson.risks = Default::default();
        let surface = render(&lesson, &Illustrations::new());
        assert_eq!(surface.blocks.len(), 5);
        assert!(surface
            .blocks
            .iter()
            .all(|b| b.kind != BlockKind::Section(SectionKind::Risks)));
    }

    #[test]
    fn illustration_adds_image_item() {
        let lesson = samples::heart_lesson();
        let without = render(&lesson, &Illustrations::new());

        let mut illustrations = Illustrations::new();
        illustrations.insert(
            SectionKind::Anatomy,
            Arc::new(RgbImage::from_pixel(360, 240, image::Rgb([200, 40, 40]))),
        );
        let with = render(&lesson, &illustrations);

        let anatomy = &with.blocks[2];
        assert_eq!(anatomy.kind, BlockKind::Section(SectionKind::Anatomy));
        let image = anatomy
            .items
            .iter()
            .find_map(|i| match i {
                Item::Image { width, height, .. } => Some((*width, *height)),
                _ => None,
            })
            .expect("image item");
        // 720px column gives 480px at 3:2, capped to 420px tall
        assert!((image.1 - 420.0).abs() < 0.5);
        assert!((image.0 - 630.0).abs() < 0.5);
        assert!(anatomy.height > without.blocks[2].height);
    }

    #[test]
    fn margins_shift_later_blocks() {
        let mut surface = render(&samples::heart_lesson(), &Illustrations::new());
        let before = surface.total_height();
        let mut margins = vec![0.0; surface.blocks.len()];
        margins[2] = 100.0;
        surface.apply_margins(&margins).unwrap();
        assert!((surface.adjusted_top(1) - surface.blocks[1].y).abs() < 0.01);
        assert!((surface.adjusted_top(3) - surface.blocks[3].y - 100.0).abs() < 0.01);
        assert!((surface.total_height() - before - 100.0).abs() < 0.01);
        assert!(surface.apply_margins(&[0.0]).is_err());
    }
}
