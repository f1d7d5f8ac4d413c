//! Vector-preserving handling of PDF sources.
//!
//! Pages are never rasterised on this path. [`load`] parses the source with
//! lopdf and describes each page by its visible box and `/Rotate`. When a
//! document is encoded, every source page's content streams become a Form
//! XObject that the new A4 page draws through a single `cm` matrix, so text
//! and paths keep their full fidelity.
//!
//! The quality level only reaches embedded raster images. Those stored as
//! 8-bit `DeviceRGB`/`DeviceGray` (raw, Flate or DCT) are resampled to the
//! effective DPI and re-encoded as JPEG whenever that makes them smaller.
//! Anything else (masks, indexed or CMYK images, exotic filters) is copied
//! untouched.

use crate::model::{Document, Page, PageGeometry, Placement, VectorPage, POINTS_PER_INCH};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, ImageFormat, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as PdfDocument, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Deepest page-tree chain followed for inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Parse `bytes` as a vector document.
///
/// `None` means lopdf cannot carry this file (unparseable, encrypted, no
/// page tree, or a page without a usable MediaBox); the caller should
/// rasterise it instead.
pub fn load(bytes: &[u8]) -> Option<Document> {
    let pdf = match PdfDocument::load_mem(bytes) {
        Ok(pdf) => pdf,
        Err(e) => {
            debug!("lopdf could not parse the source ({}), rasterising", e);
            return None;
        }
    };
    if pdf.is_encrypted() {
        debug!("Source PDF is encrypted, rasterising");
        return None;
    }

    let page_ids: Vec<ObjectId> = pdf.get_pages().into_values().collect();
    if page_ids.is_empty() {
        debug!("lopdf found no page tree, rasterising");
        return None;
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for (idx, object_id) in page_ids.into_iter().enumerate() {
        let Some(bbox) = page_box(&pdf, object_id) else {
            debug!("Page {} has no usable MediaBox, rasterising", idx + 1);
            return None;
        };
        let page = VectorPage {
            object_id,
            bbox,
            quarter_turns: page_rotation(&pdf, object_id),
        };
        debug!(
            "Page {}: box {:?}, rotate {}°",
            idx + 1,
            page.bbox,
            u32::from(page.quarter_turns) * 90
        );
        pages.push(Page::from_vector(page));
    }
    Some(Document::from_pdf(Arc::new(pdf), pages))
}

// ── Page attributes ─────────────────────────────────────────────────────────

/// Look `key` up on the page, then up the page tree.
fn inherited<'a>(pdf: &'a PdfDocument, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = pdf.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = pdf.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(pdf: &'a PdfDocument, object: &'a Object) -> &'a Object {
    pdf.dereference(object).map(|(_, o)| o).unwrap_or(object)
}

/// A PDF rectangle, normalised so that `llx < urx` and `lly < ury`.
fn rect(pdf: &PdfDocument, object: &Object) -> Option<[f32; 4]> {
    let values = resolve(pdf, object).as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut n = [0.0f32; 4];
    for (slot, value) in n.iter_mut().zip(values) {
        *slot = resolve(pdf, value).as_float().ok()?;
    }
    let r = [n[0].min(n[2]), n[1].min(n[3]), n[0].max(n[2]), n[1].max(n[3])];
    (r[2] > r[0] && r[3] > r[1]).then_some(r)
}

/// The visible box: CropBox clipped to MediaBox, or MediaBox alone.
fn page_box(pdf: &PdfDocument, page_id: ObjectId) -> Option<[f32; 4]> {
    let media = rect(pdf, inherited(pdf, page_id, b"MediaBox")?)?;
    let crop = inherited(pdf, page_id, b"CropBox").and_then(|o| rect(pdf, o));
    let visible = crop
        .map(|c| {
            [
                c[0].max(media[0]),
                c[1].max(media[1]),
                c[2].min(media[2]),
                c[3].min(media[3]),
            ]
        })
        .filter(|r| r[2] > r[0] && r[3] > r[1]);
    Some(visible.unwrap_or(media))
}

fn page_rotation(pdf: &PdfDocument, page_id: ObjectId) -> u8 {
    inherited(pdf, page_id, b"Rotate")
        .and_then(|o| resolve(pdf, o).as_i64().ok())
        .map(|degrees| (degrees / 90).rem_euclid(4) as u8)
        .unwrap_or(0)
}

// ── Placement ───────────────────────────────────────────────────────────────

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn translate(e: f32, f: f32) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e,
            f,
        }
    }

    fn scale(s: f32) -> Self {
        Self {
            a: s,
            b: 0.0,
            c: 0.0,
            d: s,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Clockwise quarter turn of a page `width` wide: `(x, y) → (y, width − x)`.
    fn quarter_turn(width: f32) -> Self {
        Self {
            a: 0.0,
            b: -1.0,
            c: 1.0,
            d: 0.0,
            e: 0.0,
            f: width,
        }
    }

    /// `self` followed by `next`.
    fn then(&self, next: &Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn operands(&self) -> Vec<Object> {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .into_iter()
            .map(Object::from)
            .collect()
    }
}

/// Map the source page's visible box onto `placement`, applying the
/// page's own `/Rotate` and the normaliser's turn.
pub(crate) fn placement_matrix(page: &VectorPage, rotated: bool, placement: Placement) -> Matrix {
    let [llx, lly, urx, ury] = page.bbox;
    let (mut w, mut h) = (urx - llx, ury - lly);
    let mut m = Matrix::translate(-llx, -lly);
    for _ in 0..(page.quarter_turns + u8::from(rotated)) {
        m = m.then(&Matrix::quarter_turn(w));
        std::mem::swap(&mut w, &mut h);
    }
    m.then(&Matrix::scale(placement.width_pt / w))
        .then(&Matrix::translate(placement.x_pt, placement.y_pt))
}

// ── Encoding ────────────────────────────────────────────────────────────────

/// Copy of `source` with its embedded rasters re-encoded for `dpi` and
/// `jpeg_quality`. No image needs more pixels than `page` at `dpi`.
pub(crate) fn prepared_copy(
    source: &PdfDocument,
    page: PageGeometry,
    dpi: u32,
    jpeg_quality: u8,
) -> PdfDocument {
    let mut pdf = source.clone();
    let bounds = pixel_bounds(page, dpi);
    let recompressed = recompress_images(&mut pdf, bounds, jpeg_quality);
    debug!(
        "Re-encoded {} embedded images (≤ {}x{} px, JPEG {})",
        recompressed, bounds.0, bounds.1, jpeg_quality
    );
    pdf
}

/// Add an output page drawing `vector` as a Form XObject into the page's
/// placement.
pub(crate) fn write_page(
    pdf: &mut PdfDocument,
    pages_id: ObjectId,
    page: &Page,
    vector: &VectorPage,
) -> Result<ObjectId, String> {
    let source_id = vector.object_id;
    if pdf.get_dictionary(source_id).is_err() {
        return Err(format!("source page {source_id:?} is missing"));
    }
    let content = pdf
        .get_page_content(source_id)
        .map_err(|e| format!("page content: {e}"))?;
    let resources = inherited(pdf, source_id, b"Resources")
        .cloned()
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    let [llx, lly, urx, ury] = vector.bbox;
    let form_id = pdf.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![llx.into(), lly.into(), urx.into(), ury.into()],
            "Resources" => resources,
        },
        content,
    ));

    let matrix = placement_matrix(vector, page.content.rotated, page.content.placement);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("cm", matrix.operands()),
            Operation::new("Do", vec![Object::Name(b"Pg0".to_vec())]),
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
            "XObject" => dictionary! { "Pg0" => form_id },
        },
    }))
}

fn pixel_bounds(page: PageGeometry, dpi: u32) -> (u32, u32) {
    let px_per_pt = dpi as f32 / POINTS_PER_INCH;
    (
        ((page.width_pt * px_per_pt).round() as u32).max(1),
        ((page.height_pt * px_per_pt).round() as u32).max(1),
    )
}

/// Shrink `width × height` to fit `bounds` in either orientation. Never
/// enlarges.
fn fit_within(width: u32, height: u32, bounds: (u32, u32)) -> (u32, u32) {
    let (long_b, short_b) = (bounds.0.max(bounds.1) as f32, bounds.0.min(bounds.1) as f32);
    let (long, short) = (width.max(height) as f32, width.min(height) as f32);
    let s = (long_b / long).min(short_b / short).min(1.0);
    (
        ((width as f32 * s).round() as u32).max(1),
        ((height as f32 * s).round() as u32).max(1),
    )
}

fn recompress_images(pdf: &mut PdfDocument, bounds: (u32, u32), jpeg_quality: u8) -> usize {
    let masks: HashSet<ObjectId> = pdf
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .flat_map(|s| [s.dict.get(b"SMask"), s.dict.get(b"Mask")])
        .filter_map(|o| o.ok()?.as_reference().ok())
        .collect();

    let mut count = 0;
    for (id, object) in pdf.objects.iter_mut() {
        if masks.contains(id) {
            continue;
        }
        if let Object::Stream(stream) = object {
            if is_image(stream) && recompress_image(stream, bounds, jpeg_quality) {
                count += 1;
            }
        }
    }
    count
}

fn is_image(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false)
}

fn recompress_image(stream: &mut Stream, bounds: (u32, u32), jpeg_quality: u8) -> bool {
    let Some(image) = decode_raster(stream) else {
        return false;
    };
    let (w, h) = fit_within(image.width(), image.height(), bounds);
    let image = if (w, h) != (image.width(), image.height()) {
        image.resize_exact(w, h, FilterType::Lanczos3)
    } else {
        image
    };
    let Ok(jpeg) = jpeg_bytes(&image, jpeg_quality) else {
        return false;
    };
    if jpeg.len() >= stream.content.len() {
        return false;
    }

    let color_space = match image {
        DynamicImage::ImageLuma8(_) => "DeviceGray",
        _ => "DeviceRGB",
    };
    stream.dict.remove(b"DecodeParms");
    stream.dict.set("Filter", "DCTDecode");
    stream.dict.set("Width", i64::from(w));
    stream.dict.set("Height", i64::from(h));
    stream.dict.set("ColorSpace", color_space);
    stream.dict.set("BitsPerComponent", 8);
    stream.set_content(jpeg);
    stream.allows_compression = false;
    true
}

/// Pixels of an 8-bit RGB or grey image XObject, if it is stored in a way
/// we can read back faithfully.
fn decode_raster(stream: &Stream) -> Option<DynamicImage> {
    let dict = &stream.dict;
    let image_mask = dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    if image_mask || dict.has(b"Decode") {
        return None;
    }
    let width = u32::try_from(dict.get(b"Width").and_then(Object::as_i64).ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").and_then(Object::as_i64).ok()?).ok()?;
    let bpc = dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok()?;
    let gray = match dict.get(b"ColorSpace").and_then(Object::as_name).ok()? {
        b"DeviceRGB" => false,
        b"DeviceGray" => true,
        _ => return None,
    };
    if bpc != 8 || width == 0 || height == 0 {
        return None;
    }

    let filters: Vec<&[u8]> = stream.filters().unwrap_or_default();
    if filters == [b"DCTDecode".as_slice()] {
        let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok()?;
        if (decoded.width(), decoded.height()) != (width, height) {
            return None;
        }
        return Some(if gray {
            DynamicImage::ImageLuma8(decoded.to_luma8())
        } else {
            DynamicImage::ImageRgb8(decoded.to_rgb8())
        });
    }
    if !(filters.is_empty() || filters == [b"FlateDecode".as_slice()]) {
        return None;
    }

    let raw = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().ok()?
    };
    let channels: usize = if gray { 1 } else { 3 };
    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(channels)?;
    if raw.len() < expected {
        return None;
    }
    let pixels = raw[..expected].to_vec();
    if gray {
        GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    }
}

fn jpeg_bytes(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    let written = match image {
        DynamicImage::ImageLuma8(gray) => encoder.write_image(
            gray.as_raw(),
            gray.width(),
            gray.height(),
            ExtendedColorType::L8,
        ),
        other => {
            let rgb = other.to_rgb8();
            encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        }
    };
    written.map_err(|e| format!("JPEG encoding failed: {e}"))?;
    Ok(buf)
}
