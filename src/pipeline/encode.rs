//! PDF encoding: `Document` + quality → PDF bytes.
//!
//! Every page becomes one page of the output with a MediaBox equal to its
//! geometry. A raster page is resampled to the effective DPI of the
//! requested quality (never upscaled), JPEG-encoded, embedded as a
//! `DCTDecode` image XObject and painted into the page's placement rectangle
//! with a `cm` transform. A vector page is drawn from its source page as a
//! Form XObject (see [`super::vector`]); only the images embedded in the
//! source are re-encoded for the quality level. Content streams are
//! Flate-compressed; the JPEG streams are left as they are.

use crate::config::RasterProfile;
use crate::error::CompressionError;
use crate::model::{Document, Page, PageSource, POINTS_PER_INCH};
use crate::pipeline::vector;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, ObjectId, Stream};
use tracing::debug;

/// Writes normalised documents as A4 PDFs.
#[derive(Debug, Clone, Copy)]
pub struct PdfEncoder {
    profile: RasterProfile,
}

impl PdfEncoder {
    pub fn new(profile: RasterProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    /// Encode `document` at quality `q` ∈ (0, 1].
    pub fn encode(&self, document: &Document, q: f32) -> Result<Vec<u8>, CompressionError> {
        let fail = |reason: String| CompressionError::EncodeFailed { quality: q, reason };
        if document.is_empty() {
            return Err(fail("document has no pages".into()));
        }

        let dpi = self.profile.dpi_at(q);
        let jpeg_quality = self.profile.jpeg_quality_at(q);

        // Source objects are carried over; the old page tree and catalog
        // become unreachable once the new root is set and are pruned.
        let mut pdf = match &document.source_pdf {
            Some(source) => vector::prepared_copy(source, document.pages[0].geometry, dpi, jpeg_quality),
            None => PdfDocument::with_version("1.7"),
        };
        let pages_id = pdf.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(document.page_count());

        for (idx, page) in document.pages.iter().enumerate() {
            let page_id = match &page.content.source {
                PageSource::Raster(raster) => {
                    write_raster_page(&mut pdf, pages_id, page, raster, dpi, jpeg_quality)
                }
                PageSource::Vector(source) => vector::write_page(&mut pdf, pages_id, page, source),
            }
            .map_err(|e| fail(format!("page {}: {e}", idx + 1)))?;
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        pdf.trailer.set("Root", catalog_id);
        if document.source_pdf.is_some() {
            let pruned = pdf.prune_objects();
            debug!("Pruned {} unreachable source objects", pruned.len());
        }
        pdf.compress();

        let mut buf = Vec::new();
        pdf.save_to(&mut buf)
            .map_err(|e| fail(format!("could not serialise PDF: {e}")))?;
        debug!(
            "Encoded {} pages at {} dpi / JPEG {} → {} bytes",
            document.page_count(),
            dpi,
            jpeg_quality,
            buf.len()
        );
        Ok(buf)
    }
}

fn write_raster_page(
    pdf: &mut PdfDocument,
    pages_id: ObjectId,
    page: &Page,
    raster: &DynamicImage,
    dpi: u32,
    jpeg_quality: u8,
) -> Result<ObjectId, String> {
    let placement = page.content.placement;
    let raster = resample(raster, placement.width_pt, placement.height_pt, dpi);
    let (width_px, height_px) = (raster.width(), raster.height());
    let jpeg = encode_jpeg(&raster, jpeg_quality)?;

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width_px as i64,
            "Height" => height_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    let image_id = pdf.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    placement.width_pt.into(),
                    0.into(),
                    0.into(),
                    placement.height_pt.into(),
                    placement.x_pt.into(),
                    placement.y_pt.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| format!("content stream: {e}"))?;
    let content_id = pdf.add_object(Stream::new(dictionary! {}, encoded));

    let geometry = page.geometry;
    Ok(pdf.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), geometry.width_pt.into(), geometry.height_pt.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    }))
}

/// Resample `raster` to cover `width_pt × height_pt` at `dpi`, never
/// exceeding its own pixel dimensions.
fn resample(raster: &DynamicImage, width_pt: f32, height_pt: f32, dpi: u32) -> DynamicImage {
    let (target_w, target_h) = target_pixels(raster, width_pt, height_pt, dpi);
    if target_w == raster.width() && target_h == raster.height() {
        raster.clone()
    } else {
        raster.resize_exact(target_w, target_h, FilterType::Lanczos3)
    }
}

fn target_pixels(raster: &DynamicImage, width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let px_per_pt = dpi as f32 / POINTS_PER_INCH;
    let w = ((width_pt * px_per_pt).round() as u32).clamp(1, raster.width().max(1));
    let h = ((height_pt * px_per_pt).round() as u32).clamp(1, raster.height().max(1));
    (w, h)
}

fn encode_jpeg(raster: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let rgb = raster.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| format!("JPEG encoding failed: {e}"))?;
    Ok(buf)
}
