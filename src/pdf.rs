//! PDF page rasterization with PDFium.
//!
//! The PDFium library is bound on first use, so a missing library only fails
//! PDF requests rather than startup.

use crate::core::{OCRError, OcrResult};
use image::RgbImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Resolution used when a request does not give one.
pub const DEFAULT_DPI: u32 = 96;

/// Longest side of a rendered page, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 4000;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders and counts the pages of uploaded PDFs.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, bytes: &[u8]) -> OcrResult<usize>;

    /// Renders the 1-based `page` at `dpi`.
    fn get_page_image(&self, bytes: &[u8], page: usize, dpi: u32) -> OcrResult<RgbImage>;
}

/// Checks that the 1-based `page` exists in a document of `page_count` pages.
pub fn check_page_range(page: usize, page_count: usize) -> OcrResult<()> {
    if page == 0 || page > page_count {
        return Err(OCRError::PageOutOfRange { page, page_count });
    }
    Ok(())
}

/// Pixel size of a `width_pt` x `height_pt` page rendered at `dpi`.
///
/// The page is scaled down, keeping its aspect ratio, so neither side exceeds
/// `max_dimension`. Both sides are at least one pixel.
pub fn render_size(width_pt: f32, height_pt: f32, dpi: u32, max_dimension: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let width = (width_pt * scale).max(1.0);
    let height = (height_pt * scale).max(1.0);

    let limit = max_dimension.max(1) as f32;
    let longest = width.max(height);
    let ratio = if longest > limit { limit / longest } else { 1.0 };

    let fit = |side: f32| ((side * ratio).round() as u32).clamp(1, max_dimension.max(1));
    (fit(width), fit(height))
}

/// [`PageRenderer`] backed by PDFium.
pub struct PdfRenderer {
    pdfium: OnceCell<Pdfium>,
    max_dimension: u32,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self {
            pdfium: OnceCell::new(),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl std::fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfRenderer")
            .field("bound", &self.pdfium.get().is_some())
            .field("max_dimension", &self.max_dimension)
            .finish()
    }
}

impl PdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the longest rendered side at `max_dimension` pixels.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// Binds PDFium from the working directory, the usual library
    /// directories, then the system loader path.
    fn pdfium(&self) -> OcrResult<&Pdfium> {
        self.pdfium.get_or_try_init(|| {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib")))
                .or_else(|_| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/local/lib"))
                })
                .or_else(|_| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/opt/homebrew/lib"))
                })
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| {
                    OCRError::config_error_detailed("pdfium", format!("could not find the PDFium library: {e}"))
                })?;
            info!("PDFium library bound");
            Ok(Pdfium::new(bindings))
        })
    }

    fn load<'a>(&'a self, bytes: &'a [u8]) -> OcrResult<PdfDocument<'a>> {
        self.pdfium()?
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| OCRError::pdf(format!("failed to open document: {e}")))
    }
}

impl PageRenderer for PdfRenderer {
    fn page_count(&self, bytes: &[u8]) -> OcrResult<usize> {
        let document = self.load(bytes)?;
        Ok(document.pages().len() as usize)
    }

    fn get_page_image(&self, bytes: &[u8], page: usize, dpi: u32) -> OcrResult<RgbImage> {
        if dpi == 0 {
            return Err(OCRError::invalid_input("dpi must be positive"));
        }
        let document = self.load(bytes)?;
        let pages = document.pages();
        check_page_range(page, pages.len() as usize)?;

        let pdf_page = pages
            .get((page - 1) as u16)
            .map_err(|e| OCRError::pdf(format!("failed to read page {page}: {e}")))?;

        let (width_px, height_px) = render_size(
            pdf_page.width().value,
            pdf_page.height().value,
            dpi,
            self.max_dimension,
        );
        let render_config = PdfRenderConfig::new()
            .set_target_width(width_px as i32)
            .set_target_height(height_px as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| OCRError::pdf(format!("failed to render page {page}: {e}")))?;
        let image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} at {} dpi: {}x{}",
            page,
            dpi,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range_is_one_based() {
        assert!(check_page_range(1, 3).is_ok());
        assert!(check_page_range(3, 3).is_ok());
    }

    #[test]
    fn test_page_past_the_end_fails() {
        match check_page_range(4, 3).unwrap_err() {
            OCRError::PageOutOfRange { page, page_count } => {
                assert_eq!((page, page_count), (4, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_size_scales_points_by_dpi() {
        // US letter is 612 x 792 pt.
        assert_eq!(render_size(612.0, 792.0, 72, DEFAULT_MAX_DIMENSION), (612, 792));
        assert_eq!(render_size(612.0, 792.0, 96, DEFAULT_MAX_DIMENSION), (816, 1056));
        assert_eq!(render_size(612.0, 792.0, 144, DEFAULT_MAX_DIMENSION), (1224, 1584));
    }

    #[test]
    fn test_render_size_caps_the_longest_side() {
        let (width, height) = render_size(612.0, 792.0, 7200, DEFAULT_MAX_DIMENSION);
        assert_eq!(height, DEFAULT_MAX_DIMENSION);
        assert_eq!(width, 3091);

        let (width, height) = render_size(792.0, 612.0, 7200, 1000);
        assert_eq!((width, height), (1000, 773));
    }

    #[test]
    fn test_render_size_is_never_empty() {
        assert_eq!(render_size(0.0, 0.0, 96, DEFAULT_MAX_DIMENSION), (1, 1));
        assert_eq!(render_size(1.0, 100_000.0, 96, 500), (1, 500));
    }

    #[test]
    fn test_renderer_defaults_to_the_standard_cap() {
        assert_eq!(PdfRenderer::new().max_dimension, DEFAULT_MAX_DIMENSION);
        assert_eq!(PdfRenderer::new().with_max_dimension(0).max_dimension, 1);
    }

    #[test]
    fn test_page_zero_fails() {
        let err = check_page_range(0, 3).unwrap_err();
        assert!(matches!(err, OCRError::PageOutOfRange { .. }));
        assert!(err.is_client_error());
    }
}
