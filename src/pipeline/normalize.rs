//! Page normalisation: map every page onto the fixed target geometry.
//!
//! Each source page is scaled uniformly by
//! `min(target_w / page_w, target_h / page_h)` so nothing is clipped, then
//! centred on a fresh page of exactly the target size. A page is turned by
//! 90° first only when that yields a strictly larger scale factor (less
//! whitespace); equal factors keep the original orientation.
//!
//! Only the placement rectangle and, for rotated raster pages, the pixels
//! change. Vector pages only record the turn; the encoder applies it with a
//! transformation matrix. Pixels are never resampled here: that is the
//! encoder's job, once per quality trial.

use crate::error::NormalizeError;
use crate::model::{Document, Page, PageContent, PageGeometry, PageSource, Placement};
use tracing::debug;

/// Relative margin by which rotation must win before it is applied.
const ROTATION_EPSILON: f32 = 1e-6;

/// How a source page is fitted onto the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    /// Turn the page 90° clockwise before scaling.
    pub rotate: bool,
    /// Uniform scale factor applied after the optional rotation.
    pub scale: f32,
}

/// Choose rotation and scale for `source` on `target`.
pub fn fit(source: PageGeometry, target: PageGeometry) -> Fit {
    let upright = scale_to_fit(source, target);
    let turned = scale_to_fit(source.rotated(), target);
    if turned > upright * (1.0 + ROTATION_EPSILON) {
        Fit {
            rotate: true,
            scale: turned,
        }
    } else {
        Fit {
            rotate: false,
            scale: upright,
        }
    }
}

fn scale_to_fit(source: PageGeometry, target: PageGeometry) -> f32 {
    (target.width_pt / source.width_pt).min(target.height_pt / source.height_pt)
}

/// Rewrites pages to a fixed geometry.
#[derive(Debug, Clone, Copy)]
pub struct PageNormalizer {
    target: PageGeometry,
}

impl Default for PageNormalizer {
    fn default() -> Self {
        Self::a4()
    }
}

impl PageNormalizer {
    pub fn new(target: PageGeometry) -> Self {
        Self { target }
    }

    /// Normaliser targeting A4 portrait.
    pub fn a4() -> Self {
        Self::new(PageGeometry::A4)
    }

    pub fn target(&self) -> PageGeometry {
        self.target
    }

    /// Normalise every page of `document`.
    ///
    /// Fails on the first page that cannot be mapped; no partially
    /// normalised document is ever returned.
    pub fn normalize(&self, document: Document) -> Result<Document, NormalizeError> {
        let Document { pages, source_pdf } = document;
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(idx, page)| self.normalize_page(idx, page))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Document { pages, source_pdf })
    }

    fn normalize_page(&self, page_index: usize, page: Page) -> Result<Page, NormalizeError> {
        let fail = |reason: String| NormalizeError { page_index, reason };

        let source = page.geometry;
        if !source.is_valid() {
            return Err(fail(format!(
                "invalid page size {}×{} pt",
                source.width_pt, source.height_pt
            )));
        }
        if let Some(raster) = page.content.raster() {
            if raster.width() == 0 || raster.height() == 0 {
                return Err(fail("page has an empty raster".into()));
            }
        }
        let placement = page.content.placement;
        if !(placement.width_pt > 0.0 && placement.height_pt > 0.0) || !placement.fits_within(source)
        {
            return Err(fail(format!(
                "content rectangle {placement:?} lies outside the {}×{} pt page",
                source.width_pt, source.height_pt
            )));
        }

        let Fit { rotate, scale } = fit(source, self.target);
        let (effective, placement, content, rotated) = if rotate {
            let content = match page.content.source {
                PageSource::Raster(raster) => PageSource::Raster(raster.rotate90()),
                vector @ PageSource::Vector(_) => vector,
            };
            (
                source.rotated(),
                rotate_placement(placement, source),
                content,
                !page.content.rotated,
            )
        } else {
            (source, placement, page.content.source, page.content.rotated)
        };

        let offset_x = (self.target.width_pt - effective.width_pt * scale) / 2.0;
        let offset_y = (self.target.height_pt - effective.height_pt * scale) / 2.0;
        let placement = Placement {
            x_pt: offset_x + placement.x_pt * scale,
            y_pt: offset_y + placement.y_pt * scale,
            width_pt: placement.width_pt * scale,
            height_pt: placement.height_pt * scale,
        };

        debug!(
            "Page {}: {:.1}×{:.1} pt → scale {:.4}{}",
            page_index + 1,
            source.width_pt,
            source.height_pt,
            scale,
            if rotate { " (rotated)" } else { "" }
        );

        Ok(Page {
            geometry: self.target,
            content: PageContent {
                source: content,
                placement,
                rotated,
            },
        })
    }
}

/// Where `placement` lands after turning a `page`-sized page 90° clockwise.
///
/// In bottom-left-origin page space a clockwise turn maps `(x, y)` to
/// `(y, page_w − x)`.
fn rotate_placement(placement: Placement, page: PageGeometry) -> Placement {
    Placement {
        x_pt: placement.y_pt,
        y_pt: page.width_pt - placement.x_pt - placement.width_pt,
        width_pt: placement.height_pt,
        height_pt: placement.width_pt,
    }
}
