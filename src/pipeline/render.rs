//! Decoding: raw source bytes → [`Document`].
//!
//! In [`RenderMode::Vector`] a PDF is parsed with lopdf and its pages stay
//! vector content (see [`super::vector`]). Files lopdf cannot carry, and
//! every PDF in [`RenderMode::Raster`], are rasterised page by page through
//! pdfium at the profile's `max_dpi`; each page keeps its physical size in
//! points. Standalone PNG and JPEG sources become a one-page document whose
//! physical size is the image interpreted at the same DPI.
//!
//! pdfium wraps a C++ library with thread-local state, so decoding is
//! synchronous and the orchestrator runs it inside `spawn_blocking`.
//!
//! ## Why cap pixels, not only DPI?
//!
//! Source pages can be any size: an A0 poster at 150 DPI would render to
//! roughly 5,000 × 7,000 px only to be shrunk onto A4 afterwards. The long
//! edge of a render is capped at what A4's long edge needs at `max_dpi`,
//! which keeps memory bounded without losing any pixel that reaches the
//! output.

use crate::config::RenderMode;
use crate::error::{BatchError, FetchError};
use crate::model::{Document, Page, PageGeometry, POINTS_PER_INCH};
use crate::pipeline::vector;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns fetched bytes into a [`Document`].
pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Document, FetchError>;
}

/// Supported source encodings, sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Png,
    Jpeg,
}

impl SourceFormat {
    /// Identify the format, or fail with `UnsupportedFormat`.
    pub fn sniff(bytes: &[u8]) -> Result<Self, FetchError> {
        if bytes.starts_with(b"%PDF") {
            Ok(SourceFormat::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Ok(SourceFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Ok(SourceFormat::Jpeg)
        } else {
            Err(FetchError::UnsupportedFormat {
                magic: bytes.iter().take(4).copied().collect(),
            })
        }
    }
}

/// Pixel size of a pdfium render of `page` at `dpi`, with the long edge
/// capped at A4's long edge at the same DPI.
pub fn render_bounds(page: PageGeometry, dpi: u32) -> (i32, i32) {
    let px_per_pt = dpi.max(1) as f32 / POINTS_PER_INCH;
    let natural_w = page.width_pt * px_per_pt;
    let natural_h = page.height_pt * px_per_pt;
    let cap = PageGeometry::A4.height_pt * px_per_pt;
    let shrink = (cap / natural_w.max(natural_h)).min(1.0);
    (
        ((natural_w * shrink).round() as i32).max(1),
        ((natural_h * shrink).round() as i32).max(1),
    )
}

/// Decoder for PDF (lopdf or pdfium) and PNG/JPEG (`image`) sources.
#[derive(Debug, Clone)]
pub struct SourceDecoder {
    dpi: u32,
    pdfium_lib_path: Option<PathBuf>,
    render_mode: RenderMode,
}

impl SourceDecoder {
    /// Vector-preserving decoder that rasterises at `dpi` when it must.
    pub fn new(dpi: u32, pdfium_lib_path: Option<PathBuf>) -> Self {
        Self {
            dpi: dpi.max(1),
            pdfium_lib_path,
            render_mode: RenderMode::default(),
        }
    }

    pub fn with_render_mode(mut self, render_mode: RenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }

    fn decode_pdf(&self, bytes: &[u8]) -> Result<Document, FetchError> {
        if self.render_mode == RenderMode::Vector {
            if let Some(document) = vector::load(bytes) {
                info!("PDF loaded as vectors: {} pages", document.page_count());
                return Ok(document);
            }
        }
        self.rasterize_pdf(bytes)
    }

    fn rasterize_pdf(&self, bytes: &[u8]) -> Result<Document, FetchError> {
        let pdfium = bind_pdfium(self.pdfium_lib_path.as_deref())
            .map_err(|e| FetchError::DecodeFailure {
                reason: e.to_string(),
            })?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            let reason = if err_str.contains("Password") || err_str.contains("password") {
                "PDF is encrypted and requires a password".to_string()
            } else {
                format!("corrupt PDF: {err_str}")
            };
            FetchError::DecodeFailure { reason }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        if total_pages == 0 {
            return Err(FetchError::DecodeFailure {
                reason: "PDF has no pages".into(),
            });
        }

        let mut out = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let geometry = PageGeometry::new(page.width().value, page.height().value);
            let (width_px, height_px) = render_bounds(geometry, self.dpi);
            let render_config = PdfRenderConfig::new()
                .set_target_width(width_px)
                .set_maximum_width(width_px)
                .set_maximum_height(height_px);
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                FetchError::DecodeFailure {
                    reason: format!("rasterisation failed for page {}: {:?}", idx + 1, e),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} ({:.0}×{:.0} pt) → {}x{} px",
                idx + 1,
                geometry.width_pt,
                geometry.height_pt,
                image.width(),
                image.height()
            );
            out.push(Page::from_raster(geometry, DynamicImage::ImageRgb8(image.to_rgb8())));
        }
        Ok(Document::new(out))
    }

    fn decode_image(&self, bytes: &[u8]) -> Result<Document, FetchError> {
        let image = image::load_from_memory(bytes).map_err(|e| FetchError::DecodeFailure {
            reason: format!("image decoding failed: {e}"),
        })?;
        let geometry = PageGeometry::from_pixels(image.width(), image.height(), self.dpi);
        debug!(
            "Decoded image {}x{} px → {:.0}×{:.0} pt",
            image.width(),
            image.height(),
            geometry.width_pt,
            geometry.height_pt
        );
        Ok(Document::new(vec![Page::from_raster(
            geometry,
            DynamicImage::ImageRgb8(image.to_rgb8()),
        )]))
    }
}

impl DocumentDecoder for SourceDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Document, FetchError> {
        match SourceFormat::sniff(bytes)? {
            SourceFormat::Pdf => self.decode_pdf(bytes),
            SourceFormat::Png | SourceFormat::Jpeg => self.decode_image(bytes),
        }
    }
}

/// Bind to libpdfium.
///
/// Resolution order: the explicit `lib_path` (a file, or a directory holding
/// the platform library), then `PDFIUM_LIB_PATH`, then the system loader.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, BatchError> {
    let explicit = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => {
            let file = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&file)
                .map_err(|e| BatchError::PdfiumBindingFailed(format!("{}: {e:?}", file.display())))?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| BatchError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}
