//! Rasterizer – paints an adjusted render surface into one tall bitmap.
//!
//! [`SurfaceRasterizer`] is the bundled implementation. Text is filled from
//! real glyph outlines when the [`FontManager`] has a TTF loaded; with the
//! synthetic metrics only, each line is drawn as a light bar of the
//! measured width so the page geometry is still visible.

use image::{imageops, Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::fonts::{FontManager, Segment, DEFAULT_FAMILY};
use crate::layout::{Item, RenderSurface, TextRun};

/// Largest bitmap edge we are willing to allocate, in device px.
pub const MAX_CANVAS_PX: u32 = 32_767;

/// Vertical samples per pixel row when filling glyph outlines.
const SUBSAMPLES: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    /// Device pixels per logical pixel.
    pub scale: f32,
    pub background: [u8; 3],
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: [255, 255, 255],
        }
    }
}

/// The master raster of a whole document.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub pixels: RgbImage,
    pub scale: f32,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Turns a render surface into a bitmap.
pub trait Rasterizer {
    fn rasterize(&self, surface: &RenderSurface, opts: &RasterOptions) -> Result<Bitmap>;
}

pub struct SurfaceRasterizer<'a> {
    pub fonts: &'a FontManager,
}

impl<'a> SurfaceRasterizer<'a> {
    pub fn new(fonts: &'a FontManager) -> Self {
        Self { fonts }
    }

    fn paint_text(&self, canvas: &mut RgbImage, run: &TextRun, x: f32, top: f32, scale: f32) {
        let ascender = self.fonts.ascender_px(run.font_size, run.bold, DEFAULT_FAMILY);
        for (i, line) in run.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_top = top + i as f32 * run.line_height;
            let baseline = line_top + (run.line_height - run.font_size) / 2.0 + ascender;

            match self.fonts.outline_text(
                line,
                run.font_size * scale,
                run.bold,
                DEFAULT_FAMILY,
                x * scale,
                baseline * scale,
            ) {
                Some(segments) => fill_outline(canvas, &segments, run.color),
                None => {
                    let width = self
                        .fonts
                        .measure_text_width(line, run.font_size, run.bold, DEFAULT_FAMILY);
                    let bar_h = run.font_size * 0.55;
                    let bar_top = baseline - bar_h;
                    fill_rect(
                        canvas,
                        x * scale,
                        bar_top * scale,
                        width * scale,
                        bar_h * scale,
                        lighten(run.color),
                    );
                }
            }
        }
    }
}

impl Rasterizer for SurfaceRasterizer<'_> {
    fn rasterize(&self, surface: &RenderSurface, opts: &RasterOptions) -> Result<Bitmap> {
        if !(opts.scale.is_finite() && opts.scale > 0.0) {
            return Err(Error::Raster(format!("invalid scale {}", opts.scale)));
        }
        let width = (surface.width * opts.scale).round() as u32;
        let height = (surface.total_height() * opts.scale).ceil().max(1.0) as u32;
        if width == 0 || width > MAX_CANVAS_PX || height > MAX_CANVAS_PX {
            return Err(Error::Raster(format!(
                "canvas {width}x{height} exceeds {MAX_CANVAS_PX}px limit"
            )));
        }

        let mut canvas = RgbImage::from_pixel(width, height, Rgb(opts.background));
        let scale = opts.scale;

        for (index, block) in surface.blocks.iter().enumerate() {
            let top = surface.adjusted_top(index);
            for item in &block.items {
                match item {
                    Item::Text(run) => self.paint_text(&mut canvas, run, run.x, top + run.y, scale),
                    Item::Rule {
                        x,
                        y,
                        width,
                        thickness,
                        color,
                    } => fill_rect(
                        &mut canvas,
                        x * scale,
                        (top + y) * scale,
                        width * scale,
                        thickness * scale,
                        *color,
                    ),
                    Item::Image {
                        x,
                        y,
                        width,
                        height,
                        pixels,
                    } => {
                        let w = (width * scale).round().max(1.0) as u32;
                        let h = (height * scale).round().max(1.0) as u32;
                        let resized =
                            imageops::resize(&**pixels, w, h, imageops::FilterType::Triangle);
                        imageops::replace(
                            &mut canvas,
                            &resized,
                            (x * scale).round() as i64,
                            ((top + y) * scale).round() as i64,
                        );
                    }
                }
            }
        }

        log::debug!("rasterized surface to {width}x{height} at {scale}x");
        Ok(Bitmap {
            pixels: canvas,
            scale,
        })
    }
}

/// Halfway between `color` and white.
fn lighten(color: [u8; 3]) -> [u8; 3] {
    color.map(|c| ((c as u16 + 255) / 2) as u8)
}

fn fill_rect(canvas: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: [u8; 3]) {
    let x0 = x.round().max(0.0) as u32;
    let y0 = y.round().max(0.0) as u32;
    let x1 = ((x + w).round().max(0.0) as u32).min(canvas.width());
    let y1 = ((y + h).round().max(0.0) as u32).min(canvas.height());
    for py in y0..y1 {
        for px in x0..x1 {
            canvas.put_pixel(px, py, Rgb(color));
        }
    }
}

fn blend(canvas: &mut RgbImage, x: u32, y: u32, color: [u8; 3], alpha: f32) {
    let dst = canvas.get_pixel_mut(x, y);
    for c in 0..3 {
        let mixed = dst.0[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
        dst.0[c] = mixed.round().clamp(0.0, 255.0) as u8;
    }
}

/// Non-zero winding scanline fill with horizontal coverage and vertical
/// supersampling.
fn fill_outline(canvas: &mut RgbImage, segments: &[Segment], color: [u8; 3]) {
    if segments.is_empty() {
        return;
    }
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for s in segments {
        min_x = min_x.min(s.x0.min(s.x1));
        max_x = max_x.max(s.x0.max(s.x1));
        min_y = min_y.min(s.y0.min(s.y1));
        max_y = max_y.max(s.y0.max(s.y1));
    }
    let col0 = min_x.floor().max(0.0) as u32;
    let col1 = (max_x.ceil().max(0.0) as u32).min(canvas.width());
    let row0 = min_y.floor().max(0.0) as u32;
    let row1 = (max_y.ceil().max(0.0) as u32).min(canvas.height());
    if col0 >= col1 || row0 >= row1 {
        return;
    }

    let mut coverage = vec![0.0f32; (col1 - col0) as usize];
    let mut crossings: Vec<(f32, i32)> = Vec::new();

    for row in row0..row1 {
        coverage.iter_mut().for_each(|c| *c = 0.0);
        for sample in 0..SUBSAMPLES {
            let sy = row as f32 + (sample as f32 + 0.5) / SUBSAMPLES as f32;
            crossings.clear();
            for s in segments {
                let (upward, lo, hi) = if s.y0 < s.y1 {
                    (false, s.y0, s.y1)
                } else {
                    (true, s.y1, s.y0)
                };
                if sy < lo || sy >= hi {
                    continue;
                }
                let t = (sy - s.y0) / (s.y1 - s.y0);
                let x = s.x0 + t * (s.x1 - s.x0);
                crossings.push((x, if upward { -1 } else { 1 }));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding != 0 {
                    add_span(&mut coverage, col0 as f32, pair[0].0, pair[1].0);
                }
            }
        }
        for (i, c) in coverage.iter().enumerate() {
            let alpha = (c / SUBSAMPLES as f32).min(1.0);
            if alpha > 0.0 {
                blend(canvas, col0 + i as u32, row, color, alpha);
            }
        }
    }
}

/// Accumulate the horizontal coverage of `[xa, xb)` into `coverage`, whose
/// first cell is at `origin`.
fn add_span(coverage: &mut [f32], origin: f32, xa: f32, xb: f32) {
    let a = (xa - origin).max(0.0);
    let b = (xb - origin).min(coverage.len() as f32);
    if a >= b {
        return;
    }
    let first = a.floor() as usize;
    let last = (b.ceil() as usize).min(coverage.len());
    for (px, cell) in coverage.iter_mut().enumerate().take(last).skip(first) {
        let left = a.max(px as f32);
        let right = b.min(px as f32 + 1.0);
        if right > left {
            *cell += right - left;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{render_lesson, Illustrations, RenderStyle};
    use crate::lesson::SectionKind;
    use crate::samples;
    use std::sync::Arc;

    fn surface(illustrations: &Illustrations) -> RenderSurface {
        render_lesson(
            &samples::heart_lesson(),
            illustrations,
            800.0,
            &FontManager::default(),
            &RenderStyle::default(),
        )
        .unwrap()
    }

    #[test]
    fn bitmap_size_follows_scale() {
        let fonts = FontManager::default();
        let surface = surface(&Illustrations::new());
        let bitmap = SurfaceRasterizer::new(&fonts)
            .rasterize(&surface, &RasterOptions::default())
            .unwrap();
        assert_eq!(bitmap.width(), 1600);
        assert_eq!(bitmap.height(), (surface.total_height() * 2.0).ceil() as u32);
    }

    #[test]
    fn pushdown_leaves_blank_band() {
        let fonts = FontManager::default();
        let mut surface = surface(&Illustrations::new());
        let mut margins = vec![0.0; surface.blocks.len()];
        margins[1] = 200.0;
        surface.apply_margins(&margins).unwrap();
        let bitmap = SurfaceRasterizer::new(&fonts)
            .rasterize(&surface, &RasterOptions { scale: 1.0, ..Default::default() })
            .unwrap();

        let band_top = surface.blocks[1].y as u32;
        for y in band_top..band_top + 200 {
            for x in (0..800).step_by(7) {
                assert_eq!(bitmap.pixels.get_pixel(x, y).0, [255, 255, 255]);
            }
        }
    }

    #[test]
    fn illustration_pixels_are_painted() {
        let fonts = FontManager::default();
        let mut illustrations = Illustrations::new();
        illustrations.insert(
            SectionKind::Technique,
            Arc::new(RgbImage::from_pixel(100, 50, Rgb([10, 200, 30]))),
        );
        let surface = surface(&illustrations);
        let bitmap = SurfaceRasterizer::new(&fonts)
            .rasterize(&surface, &RasterOptions { scale: 1.0, ..Default::default() })
            .unwrap();

        let index = surface
            .blocks
            .iter()
            .position(|b| b.kind == crate::layout::BlockKind::Section(SectionKind::Technique))
            .unwrap();
        let (x, y, w, h) = surface.blocks[index]
            .items
            .iter()
            .find_map(|i| match i {
                Item::Image {
                    x, y, width, height, ..
                } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .unwrap();
        let top = surface.adjusted_top(index);
        let centre = bitmap
            .pixels
            .get_pixel((x + w / 2.0) as u32, (top + y + h / 2.0) as u32);
        assert_eq!(centre.0, [10, 200, 30]);
    }

    #[test]
    fn oversized_canvas_is_an_error() {
        let fonts = FontManager::default();
        let surface = surface(&Illustrations::new());
        let err = SurfaceRasterizer::new(&fonts)
            .rasterize(&surface, &RasterOptions { scale: 100.0, ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Raster(_)));
    }

    #[test]
    fn outline_fill_covers_square() {
        let mut canvas = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let square = [
            Segment { x0: 2.0, y0: 2.0, x1: 8.0, y1: 2.0 },
            Segment { x0: 8.0, y0: 2.0, x1: 8.0, y1: 8.0 },
            Segment { x0: 8.0, y0: 8.0, x1: 2.0, y1: 8.0 },
            Segment { x0: 2.0, y0: 8.0, x1: 2.0, y1: 2.0 },
        ];
        fill_outline(&mut canvas, &square, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(5, 5).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(1, 1).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(8, 5).0, [255, 255, 255]);
    }
}
