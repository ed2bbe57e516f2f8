//! Page slicer – places the master bitmap onto A4 pages and writes the PDF.
//!
//! Pages are not cut from separate bitmap regions. The whole image is drawn
//! on every page, shifted up by one page height per page, and each page's
//! 210 × 297 mm box clips it.

use printpdf::*;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::raster::Bitmap;

/// A4 portrait page width in millimetres.
pub const PAGE_WIDTH_MM: f32 = 210.0;
/// A4 portrait page height in millimetres.
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Where the master image sits on one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSlice {
    /// 0-based page index.
    pub index: usize,
    /// Vertical position of the image top relative to the page top, in mm
    /// (0 on the first page, negative afterwards).
    pub offset_mm: f32,
}

/// Height of the master image once scaled to the page width.
pub fn image_height_mm(width_px: u32, height_px: u32) -> f32 {
    if width_px == 0 {
        return 0.0;
    }
    height_px as f32 * PAGE_WIDTH_MM / width_px as f32
}

/// Plan page placements for an image `img_height_mm` tall.
pub fn slice_pages(img_height_mm: f32) -> Vec<PageSlice> {
    let mut pages = vec![PageSlice {
        index: 0,
        offset_mm: 0.0,
    }];
    let mut height_left = img_height_mm - PAGE_HEIGHT_MM;

    while height_left > 0.0 {
        pages.push(PageSlice {
            index: pages.len(),
            offset_mm: height_left - img_height_mm,
        });
        height_left -= PAGE_HEIGHT_MM;
    }
    pages
}

/// Document-level metadata for the writer.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    /// JPEG quality in `0.0..=1.0`.
    pub jpeg_quality: f32,
}

/// Assembles page placements of a bitmap into document bytes.
pub trait DocumentWriter {
    fn write_document(&self, bitmap: &Bitmap, pages: &[PageSlice], meta: &DocumentMeta)
        -> Result<Vec<u8>>;
}

/// Writes A4 PDFs with `printpdf`. The bitmap is JPEG-encoded once and the
/// same XObject is referenced from every page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfWriter;

impl DocumentWriter for PdfWriter {
    fn write_document(
        &self,
        bitmap: &Bitmap,
        pages: &[PageSlice],
        meta: &DocumentMeta,
    ) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(Error::Document("no pages to write".to_string()));
        }
        let (px_w, px_h) = (bitmap.width(), bitmap.height());
        if px_w == 0 || px_h == 0 {
            return Err(Error::Document("empty bitmap".to_string()));
        }

        let jpeg = encode_jpeg(bitmap, meta.jpeg_quality)?;

        let mut doc = PdfDocument::new(&meta.title);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let raw = RawImage::decode_from_bytes(&jpeg, &mut warnings)
            .map_err(|e| Error::Document(format!("image embed error: {e}")))?;
        if !warnings.is_empty() {
            log::debug!("printpdf reported {} warning(s) embedding the page image", warnings.len());
        }
        let xobj_id = doc.add_image(&raw);

        let img_h_mm = image_height_mm(px_w, px_h);
        let page_h_pt = PAGE_HEIGHT_MM * PT_PER_MM;
        // At dpi=72 printpdf maps 1 px to 1 pt.
        let scale = PAGE_WIDTH_MM * PT_PER_MM / px_w as f32;

        let pdf_pages: Vec<PdfPage> = pages
            .iter()
            .map(|slice| {
                // PDF origin is bottom-left; `offset_mm` is measured downwards
                // from the page top to the image top.
                let img_bottom_pt = page_h_pt - (slice.offset_mm + img_h_mm) * PT_PER_MM;
                let ops = vec![Op::UseXobject {
                    id: xobj_id.clone(),
                    transform: XObjectTransform {
                        translate_x: Some(Pt(0.0)),
                        translate_y: Some(Pt(img_bottom_pt)),
                        dpi: Some(72.0),
                        scale_x: Some(scale),
                        scale_y: Some(scale),
                        rotate: None,
                    },
                }];
                PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops)
            })
            .collect();

        doc.with_pages(pdf_pages);
        let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
        log::debug!(
            "wrote {} page(s), {} bytes, image {}x{}px",
            pages.len(),
            bytes.len(),
            px_w,
            px_h
        );
        Ok(bytes)
    }
}

/// JPEG-encode the bitmap; `quality` is a fraction in `0.0..=1.0`.
pub fn encode_jpeg(bitmap: &Bitmap, quality: f32) -> Result<Vec<u8>> {
    let q = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
    let mut out = Vec::new();
    ::image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, q)
        .encode_image(&bitmap.pixels)
        .map_err(|e| Error::Document(format!("JPEG encode error: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgb, RgbImage};

    #[test]
    fn image_height_preserves_aspect() {
        assert!((image_height_mm(1600, 3200) - 420.0).abs() < 1e-3);
        assert_eq!(image_height_mm(0, 100), 0.0);
    }

    #[test]
    fn page_count_is_ceil_of_height() {
        for h in [1.0f32, 100.0, 296.0, 297.0, 298.0, 594.0, 600.0, 1000.0, 2970.5] {
            let pages = slice_pages(h);
            assert_eq!(pages.len(), (h / PAGE_HEIGHT_MM).ceil() as usize, "h = {h}");
        }
    }

    #[test]
    fn offsets_shift_up_one_page_at_a_time() {
        let pages = slice_pages(700.0);
        let offsets: Vec<f32> = pages.iter().map(|p| p.offset_mm).collect();
        assert_eq!(offsets, vec![0.0, -297.0, -594.0]);
        assert_eq!(pages[2].index, 2);
    }

    #[test]
    fn short_image_gets_one_page() {
        assert_eq!(slice_pages(0.0).len(), 1);
    }

    #[test]
    fn writes_pdf_with_pages() {
        let bitmap = Bitmap {
            pixels: RgbImage::from_pixel(160, 500, Rgb([240, 240, 240])),
            scale: 2.0,
        };
        let pages = slice_pages(image_height_mm(160, 500));
        assert_eq!(pages.len(), 3);
        let meta = DocumentMeta {
            title: "Test".into(),
            jpeg_quality: 0.85,
        };
        let bytes = PdfWriter.write_document(&bitmap, &pages, &meta).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn higher_quality_is_not_smaller() {
        let mut pixels = RgbImage::new(64, 64);
        for (x, y, p) in pixels.enumerate_pixels_mut() {
            *p = Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8]);
        }
        let bitmap = Bitmap { pixels, scale: 1.0 };
        let bulk = encode_jpeg(&bitmap, 0.85).unwrap();
        let high = encode_jpeg(&bitmap, 0.95).unwrap();
        assert!(high.len() >= bulk.len());
    }

    #[test]
    fn empty_page_list_is_an_error() {
        let bitmap = Bitmap {
            pixels: RgbImage::new(10, 10),
            scale: 1.0,
        };
        let meta = DocumentMeta {
            title: "x".into(),
            jpeg_quality: 0.9,
        };
        assert!(matches!(
            PdfWriter.write_document(&bitmap, &[], &meta),
            Err(Error::Document(_))
        ));
    }
}
