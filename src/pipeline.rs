//! Pipeline – ties together settling, layout, measurement, planning,
//! rasterization, slicing and delivery into a single call.
//!
//! Stages run strictly in order and each completes before the next starts.
//! The off-screen surface of an export lives in an [`OffscreenSurface`]
//! guard and is torn down on every path, including errors.

use serde::Serialize;

use crate::config::ExportConfig;
use crate::delivery::{sanitize_filename, Delivered, Delivery};
use crate::error::{Error, Result};
use crate::fonts::FontManager;
use crate::layout::{render_lesson, BlockKind, Illustrations, RenderStyle, RenderSurface};
use crate::lesson::LessonDocument;
use crate::measure::{BlockMeasurer, LayoutMeasurer};
use crate::planner::PaginationPlanner;
use crate::raster::{RasterOptions, Rasterizer, SurfaceRasterizer};
use crate::settle::{settle_illustrations, SettleReport};
use crate::slicer::{image_height_mm, slice_pages, DocumentMeta, DocumentWriter, PageSlice, PdfWriter};

/// One planned top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedBlock {
    pub kind: BlockKind,
    pub height_px: f32,
    pub margin_px: f32,
}

/// What an export did, or would do.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub title: String,
    pub filename: String,
    pub blocks: Vec<PlannedBlock>,
    pub settle: SettleReport,
    /// Master bitmap size in device px (0×0 for a plan-only run).
    pub bitmap_px: (u32, u32),
    pub pages: Vec<PageSlice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<Delivered>,
}

impl ExportReport {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn margins(&self) -> Vec<f32> {
        self.blocks.iter().map(|b| b.margin_px).collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// A built document that has not been delivered yet.
#[derive(Debug, Clone)]
pub struct BuiltDocument {
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

/// The throwaway render of one export.
struct OffscreenSurface {
    surface: RenderSurface,
}

impl Drop for OffscreenSurface {
    fn drop(&mut self) {
        log::debug!(
            "off-screen surface torn down ({} blocks)",
            self.surface.blocks.len()
        );
    }
}

pub struct Exporter<'a> {
    config: ExportConfig,
    fonts: &'a FontManager,
    style: RenderStyle,
    measurer: Box<dyn BlockMeasurer + 'a>,
    rasterizer: Box<dyn Rasterizer + 'a>,
    writer: Box<dyn DocumentWriter + 'a>,
}

impl<'a> Exporter<'a> {
    /// Exporter with the bundled layout measurer, rasterizer and PDF writer.
    pub fn new(config: ExportConfig, fonts: &'a FontManager) -> Result<Self> {
        config.validate()?;
        let style = RenderStyle::default();
        Ok(Self {
            config,
            fonts,
            measurer: Box::new(LayoutMeasurer {
                fonts,
                style: style.clone(),
            }),
            rasterizer: Box::new(SurfaceRasterizer::new(fonts)),
            writer: Box::new(PdfWriter),
            style,
        })
    }

    pub fn with_measurer(mut self, measurer: Box<dyn BlockMeasurer + 'a>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn Rasterizer + 'a>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_writer(mut self, writer: Box<dyn DocumentWriter + 'a>) -> Self {
        self.writer = writer;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Settle illustrations, lay out, measure and plan; no rasterization.
    fn prepare(&self, lesson: &LessonDocument) -> Result<(OffscreenSurface, ExportReport)> {
        if is_blank(lesson) {
            log::error!("nothing to export: lesson has no title and no content");
            return Err(Error::MissingRenderTarget);
        }

        let (illustrations, settle) =
            settle_illustrations(lesson, self.config.settle_timeout());

        let mut offscreen = OffscreenSurface {
            surface: self.render(lesson, &illustrations)?,
        };
        if offscreen.surface.blocks.is_empty() {
            log::error!("render surface for '{}' has no blocks", lesson.title);
            return Err(Error::MissingRenderTarget);
        }

        let measured = self
            .measurer
            .measure(lesson, &illustrations, self.config.container_width_px)?;
        let heights: Vec<f32> = measured.iter().map(|m| m.height).collect();
        let margins = PaginationPlanner::new(self.config.page_height_px).plan(&heights);

        // Measurers may disagree with the surface on which blocks exist;
        // match margins up by block kind.
        let surface_margins: Vec<f32> = offscreen
            .surface
            .blocks
            .iter()
            .map(|block| {
                measured
                    .iter()
                    .zip(&margins)
                    .find(|(m, _)| m.kind == block.kind)
                    .map(|(_, margin)| *margin)
                    .unwrap_or(0.0)
            })
            .collect();
        offscreen.surface.apply_margins(&surface_margins)?;

        let blocks = offscreen
            .surface
            .blocks
            .iter()
            .map(|b| PlannedBlock {
                kind: b.kind,
                height_px: b.height,
                margin_px: b.extra_top_margin,
            })
            .collect();

        // Page count the rasterized surface will need.
        let expected_px = (
            (self.config.container_width_px * self.config.scale).round() as u32,
            (offscreen.surface.total_height() * self.config.scale).ceil().max(1.0) as u32,
        );
        let pages = slice_pages(image_height_mm(expected_px.0, expected_px.1));

        let report = ExportReport {
            title: lesson.title.clone(),
            filename: sanitize_filename(&lesson.title),
            blocks,
            settle,
            bitmap_px: (0, 0),
            pages,
            delivered: None,
        };
        Ok((offscreen, report))
    }

    fn render(&self, lesson: &LessonDocument, illustrations: &Illustrations) -> Result<RenderSurface> {
        render_lesson(
            lesson,
            illustrations,
            self.config.container_width_px,
            self.fonts,
            &self.style,
        )
    }

    /// Compute block margins and page placements without producing a file.
    pub fn plan(&self, lesson: &LessonDocument) -> Result<ExportReport> {
        let (_offscreen, report) = self.prepare(lesson)?;
        Ok(report)
    }

    /// Build the document bytes.
    pub fn build(&self, lesson: &LessonDocument) -> Result<BuiltDocument> {
        let (offscreen, mut report) = self.prepare(lesson)?;

        let opts = RasterOptions {
            scale: self.config.scale,
            ..RasterOptions::default()
        };
        let bitmap = self
            .rasterizer
            .rasterize(&offscreen.surface, &opts)
            .inspect_err(|e| log::error!("export of '{}' failed: {e}", lesson.title))?;
        drop(offscreen);

        let pages = slice_pages(image_height_mm(bitmap.width(), bitmap.height()));
        let meta = DocumentMeta {
            title: lesson.title.clone(),
            jpeg_quality: self.config.quality.jpeg_quality(),
        };
        let bytes = self
            .writer
            .write_document(&bitmap, &pages, &meta)
            .inspect_err(|e| log::error!("export of '{}' failed: {e}", lesson.title))?;

        report.bitmap_px = (bitmap.width(), bitmap.height());
        report.pages = pages;
        log::info!(
            "built '{}': {} page(s), {} bytes",
            report.filename,
            report.page_count(),
            bytes.len()
        );
        Ok(BuiltDocument { bytes, report })
    }

    /// Build the document and hand it to `delivery`.
    pub fn export(&self, lesson: &LessonDocument, delivery: &Delivery) -> Result<ExportReport> {
        let BuiltDocument { bytes, mut report } = self.build(lesson)?;
        let delivered = delivery.deliver(&bytes, &report.filename, &self.config.share_caption)?;
        report.delivered = Some(delivered);
        Ok(report)
    }
}

fn is_blank(lesson: &LessonDocument) -> bool {
    lesson.title.trim().is_empty()
        && lesson.sections().iter().all(|(_, s)| {
            s.heading.trim().is_empty() && s.body.trim().is_empty() && s.illustration.is_none()
        })
}

/// Convenience: lesson → PDF bytes with default fonts and config.
pub fn generate_pdf(lesson: &LessonDocument) -> Result<Vec<u8>> {
    let fonts = FontManager::default();
    let exporter = Exporter::new(ExportConfig::default(), &fonts)?;
    Ok(exporter.build(lesson)?.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Item;
    use crate::lesson::SectionKind;
    use crate::raster::Bitmap;
    use crate::samples;

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn rasterize(&self, _: &RenderSurface, _: &RasterOptions) -> Result<Bitmap> {
            Err(Error::Raster("capture refused".into()))
        }
    }

    struct FailingWriter;

    impl DocumentWriter for FailingWriter {
        fn write_document(&self, _: &Bitmap, _: &[PageSlice], _: &DocumentMeta) -> Result<Vec<u8>> {
            Err(Error::Document("assembly refused".into()))
        }
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lesson-forge-pipeline-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn pipeline_basic() {
        let bytes = generate_pdf(&samples::heart_lesson()).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn blank_lesson_is_missing_render_target() {
        let fonts = FontManager::default();
        let exporter = Exporter::new(ExportConfig::default(), &fonts).unwrap();
        let err = exporter.build(&LessonDocument::default()).unwrap_err();
        assert!(matches!(err, Error::MissingRenderTarget));
    }

    #[test]
    fn raster_failure_propagates() {
        let fonts = FontManager::default();
        let exporter = Exporter::new(ExportConfig::default(), &fonts)
            .unwrap()
            .with_rasterizer(Box::new(FailingRasterizer));
        let err = exporter.build(&samples::heart_lesson()).unwrap_err();
        assert!(matches!(err, Error::Raster(_)));
    }

    #[test]
    fn document_failure_leaves_no_file() {
        let dir = scratch_dir("writer");
        let fonts = FontManager::default();
        let exporter = Exporter::new(ExportConfig::default(), &fonts)
            .unwrap()
            .with_writer(Box::new(FailingWriter));
        let err = exporter
            .export(&samples::heart_lesson(), &Delivery::local(&dir))
            .unwrap_err();
        assert!(matches!(err, Error::Document(_)));
        assert!(!dir.join("Srce_i_Krvni_Sudovi.pdf").exists());
        assert!(!dir.join("Srce_i_Krvni_Sudovi.pdf.part").exists());
    }

    #[test]
    fn unsettled_illustration_is_not_drawn() {
        let fonts = FontManager::default();
        let config = ExportConfig {
            settle_timeout_ms: 0,
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(config, &fonts).unwrap();
        let mut lesson = samples::heart_lesson();
        lesson.section_mut(SectionKind::Anatomy).illustration =
            Some(samples::solid_png_data_uri(3000, 3000, [120, 20, 20]));

        let (offscreen, report) = exporter.prepare(&lesson).unwrap();
        assert_eq!(report.settle.timed_out, vec![SectionKind::Anatomy]);
        let anatomy = offscreen
            .surface
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Section(SectionKind::Anatomy))
            .unwrap();
        assert!(anatomy
            .items
            .iter()
            .all(|item| !matches!(item, Item::Image { .. })));
    }

    #[test]
    fn plan_matches_build_page_count() {
        let fonts = FontManager::default();
        let exporter = Exporter::new(ExportConfig::default(), &fonts).unwrap();
        let lesson = samples::long_lesson();
        let plan = exporter.plan(&lesson).unwrap();
        let built = exporter.build(&lesson).unwrap();
        assert_eq!(plan.page_count(), built.report.page_count());
        assert_eq!(plan.margins(), built.report.margins());
        assert!(built.report.page_count() > 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let fonts = FontManager::default();
        let config = ExportConfig {
            page_height_px: -1.0,
            ..ExportConfig::default()
        };
        assert!(matches!(
            Exporter::new(config, &fonts),
            Err(Error::Config(_))
        ));
    }
}
