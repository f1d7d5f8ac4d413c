//! In-memory document model shared by every pipeline stage.
//!
//! A [`Document`] is an ordered list of [`Page`]s. Each page carries its
//! physical [`PageGeometry`] in PDF points and a [`PageContent`]: what is
//! drawn ([`PageSource`]) plus the rectangle it occupies on the page.
//! Decoding produces pages whose content fills the whole page;
//! normalisation swaps the geometry for A4 and shrinks/centres the
//! placement; encoding draws the content into the placement.
//!
//! Content is either a raster (image sources, or PDFs rendered by pdfium)
//! or a page of the source PDF kept as vector content. Vector pages refer
//! into the parsed source held by the [`Document`].
//!
//! Page count is preserved end-to-end: no stage adds or removes pages.

use image::DynamicImage;
use lopdf::Document as PdfDocument;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Millimetres per inch.
const MM_PER_INCH: f32 = 25.4;

/// Physical page size in PDF points (1/72 in).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Page orientation. Square pages count as portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl PageGeometry {
    /// ISO 216 A4 portrait: 210 × 297 mm.
    pub const A4: PageGeometry = PageGeometry {
        width_pt: 210.0 * POINTS_PER_INCH / MM_PER_INCH,
        height_pt: 297.0 * POINTS_PER_INCH / MM_PER_INCH,
    };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self::new(
            width_mm * POINTS_PER_INCH / MM_PER_INCH,
            height_mm * POINTS_PER_INCH / MM_PER_INCH,
        )
    }

    /// Geometry of a raster of `width_px × height_px` interpreted at `dpi`.
    pub fn from_pixels(width_px: u32, height_px: u32, dpi: u32) -> Self {
        let scale = POINTS_PER_INCH / dpi.max(1) as f32;
        Self::new(width_px as f32 * scale, height_px as f32 * scale)
    }

    pub fn orientation(&self) -> Orientation {
        if self.width_pt > self.height_pt {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    /// The same page turned by 90°.
    pub fn rotated(&self) -> Self {
        Self::new(self.height_pt, self.width_pt)
    }

    /// Both sides finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width_pt.is_finite()
            && self.height_pt.is_finite()
            && self.width_pt > 0.0
            && self.height_pt > 0.0
    }

    /// Equality within `tolerance_pt` on both sides.
    pub fn approx_eq(&self, other: &PageGeometry, tolerance_pt: f32) -> bool {
        (self.width_pt - other.width_pt).abs() <= tolerance_pt
            && (self.height_pt - other.height_pt).abs() <= tolerance_pt
    }
}

/// Axis-aligned rectangle in page space; origin at the bottom-left corner,
/// as in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x_pt: f32,
    pub y_pt: f32,
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Placement {
    /// The rectangle covering the whole page.
    pub fn full(geometry: PageGeometry) -> Self {
        Self {
            x_pt: 0.0,
            y_pt: 0.0,
            width_pt: geometry.width_pt,
            height_pt: geometry.height_pt,
        }
    }

    /// Whether the rectangle lies inside `geometry` (with a small tolerance
    /// for rounding).
    pub fn fits_within(&self, geometry: PageGeometry) -> bool {
        const EPS: f32 = 1e-3;
        self.x_pt >= -EPS
            && self.y_pt >= -EPS
            && self.x_pt + self.width_pt <= geometry.width_pt + EPS
            && self.y_pt + self.height_pt <= geometry.height_pt + EPS
    }
}

/// A page of the source PDF, drawn from its own content streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorPage {
    /// Page object in the source document.
    pub object_id: (u32, u16),
    /// Visible box in source user space: `[llx, lly, urx, ury]`.
    pub bbox: [f32; 4],
    /// The page's own `/Rotate`, in clockwise quarter turns (0..=3).
    pub quarter_turns: u8,
}

impl VectorPage {
    /// Size of the page as a viewer shows it, `/Rotate` applied.
    pub fn displayed_geometry(&self) -> PageGeometry {
        let [llx, lly, urx, ury] = self.bbox;
        let (w, h) = (urx - llx, ury - lly);
        if self.quarter_turns % 2 == 1 {
            PageGeometry::new(h, w)
        } else {
            PageGeometry::new(w, h)
        }
    }
}

/// What a page draws.
#[derive(Debug, Clone)]
pub enum PageSource {
    /// Pixels, in drawing orientation.
    Raster(DynamicImage),
    /// Untouched vector content of a source PDF page.
    Vector(VectorPage),
}

/// What is drawn on a page.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub source: PageSource,
    /// Where the content is painted on the page.
    pub placement: Placement,
    /// Whether the content was turned 90° clockwise during normalisation.
    /// Rasters are turned in place; vector pages are turned when drawn.
    pub rotated: bool,
}

impl PageContent {
    pub fn raster(&self) -> Option<&DynamicImage> {
        match &self.source {
            PageSource::Raster(image) => Some(image),
            PageSource::Vector(_) => None,
        }
    }
}

/// One page of a [`Document`].
#[derive(Debug, Clone)]
pub struct Page {
    pub geometry: PageGeometry,
    pub content: PageContent,
}

impl Page {
    /// A page whose raster fills the whole page.
    pub fn from_raster(geometry: PageGeometry, raster: DynamicImage) -> Self {
        Self {
            geometry,
            content: PageContent {
                source: PageSource::Raster(raster),
                placement: Placement::full(geometry),
                rotated: false,
            },
        }
    }

    /// A source PDF page at its displayed size.
    pub fn from_vector(page: VectorPage) -> Self {
        let geometry = page.displayed_geometry();
        Self {
            geometry,
            content: PageContent {
                source: PageSource::Vector(page),
                placement: Placement::full(geometry),
                rotated: false,
            },
        }
    }
}

/// A decoded document: an ordered sequence of pages.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    /// Parsed source PDF that vector pages refer into.
    pub source_pdf: Option<Arc<PdfDocument>>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            source_pdf: None,
        }
    }

    /// Pages drawn from `source`.
    pub fn from_pdf(source: Arc<PdfDocument>, pages: Vec<Page>) -> Self {
        Self {
            pages,
            source_pdf: Some(source),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
