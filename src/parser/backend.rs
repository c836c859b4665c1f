//! Document engine abstraction.
//!
//! The pipeline never touches a concrete PDF library directly. Everything it
//! needs from a paginated document (page geometry, primitive iteration,
//! image bytes, rasterization, verbatim page copies) goes through the
//! [`DocumentEngine`] trait. [`LopdfBackend`] is the lopdf implementation.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use super::content::ContentInterpreter;
use super::fonts::{get_number, resolve, resolve_dict};
use super::images::{decode_image, extract_image, parse_image_ref, ImageData};
use super::raster::{rasterize, Raster};
use crate::error::{Error, Result};
use crate::model::{GeometricPrimitive, ImageRef, Metadata, PageInfo, Rect};
use crate::rebuild::PdfWriter;

/// Page size used when a page has no usable MediaBox (US Letter).
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Parent chains longer than this are treated as malformed.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Capability providing page parsing, primitive iteration and rasterization.
///
/// A handle is owned exclusively by one extraction or reconstruction call.
pub trait DocumentEngine {
    /// Number of pages.
    fn page_count(&self) -> u32;

    /// Geometry of a page (1-indexed).
    fn page(&self, number: u32) -> Result<PageInfo>;

    /// Every primitive drawn on a page, in top-left native coordinates.
    fn primitives(&self, number: u32) -> Result<Vec<GeometricPrimitive>>;

    /// Encoded bytes of an image drawn on a page.
    fn image_data(&self, number: u32, image: &ImageRef) -> Result<ImageData>;

    /// Document metadata.
    fn metadata(&self) -> Metadata {
        Metadata {
            page_count: self.page_count(),
            ..Metadata::default()
        }
    }

    /// Rasterize a page with `redactions` blanked to white.
    ///
    /// `scale` is device pixels per native unit.
    fn rasterize(&self, number: u32, redactions: &[Rect], scale: f32) -> Result<Raster> {
        let page = self.page(number)?;
        let primitives = self.primitives(number)?;
        rasterize(page.width, page.height, &primitives, redactions, scale, |image| {
            let data = self.image_data(number, image)?;
            Ok(image::load_from_memory(&data.bytes)?.to_rgba8())
        })
    }

    /// Append pages of this document to `writer` unchanged.
    ///
    /// Engines that cannot copy page content produce blank pages of the same
    /// size, which keeps the page count and dimensions.
    fn copy_pages_into(&self, numbers: &[u32], writer: &mut PdfWriter) -> Result<()> {
        log::warn!("engine cannot copy page content, writing blank pages");
        for &number in numbers {
            let page = self.page(number)?;
            writer.add_blank_page(page.width, page.height);
        }
        Ok(())
    }
}

/// [`DocumentEngine`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
    pages: BTreeMap<u32, ObjectId>,
}

impl LopdfBackend {
    /// Load from a file path.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let doc = LopdfDocument::load(path.as_ref())?;
        Ok(Self::from_document(doc))
    }

    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        Ok(Self::from_document(doc))
    }

    /// Load from a reader.
    pub fn load_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::load_bytes(&data)
    }

    /// Wrap an already loaded document.
    pub fn from_document(doc: LopdfDocument) -> Self {
        let pages = doc.get_pages();
        log::debug!("loaded PDF {} with {} pages", doc.version, pages.len());
        Self { doc, pages }
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Check if the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.doc.is_encrypted()
    }

    /// Get PDF version string.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    fn page_id(&self, number: u32) -> Result<ObjectId> {
        self.pages
            .get(&number)
            .copied()
            .ok_or(Error::PageOutOfRange(number, self.pages.len() as u32))
    }

    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        inherited_attribute(&self.doc, page_id, key)
    }

    fn media_box(&self, page_id: ObjectId) -> Rect {
        let values: Option<Vec<f32>> = self
            .inherited(page_id, b"MediaBox")
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .filter_map(|o| resolve(&self.doc, o).and_then(get_number))
                    .collect()
            });
        match values.as_deref() {
            Some([x0, y0, x1, y1, ..]) if x0 != x1 && y0 != y1 => {
                Rect::new(x0.min(*x1), y0.min(*y1), x0.max(*x1), y0.max(*y1))
            }
            _ => Rect::new(0.0, 0.0, DEFAULT_PAGE_SIZE.0, DEFAULT_PAGE_SIZE.1),
        }
    }

    fn resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        self.inherited(page_id, b"Resources")
            .and_then(|o| o.as_dict().ok())
    }

    /// Get the decompressed content stream of a page.
    fn page_content(&self, page_id: ObjectId) -> Result<Vec<u8>> {
        let page_dict = self.doc.get_dictionary(page_id)?;
        let Ok(contents) = page_dict.get(b"Contents") else {
            return Ok(Vec::new());
        };

        match resolve(&self.doc, contents) {
            Some(Object::Stream(s)) => Ok(stream_content(s)),
            Some(Object::Array(arr)) => {
                let mut content = Vec::new();
                for obj in arr {
                    if let Some(Object::Stream(s)) = resolve(&self.doc, obj) {
                        content.extend_from_slice(&stream_content(s));
                        content.push(b' ');
                    }
                }
                Ok(content)
            }
            _ => Err(Error::PdfParse("Invalid content stream".to_string())),
        }
    }

    fn extract_metadata(&self) -> Metadata {
        let mut metadata = Metadata::with_version(self.doc.version.to_string());
        metadata.page_count = self.pages.len() as u32;

        let info = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|o| resolve_dict(&self.doc, o));
        if let Some(info) = info {
            metadata.title = get_string_from_dict(info, b"Title");
            metadata.author = get_string_from_dict(info, b"Author");
            metadata.subject = get_string_from_dict(info, b"Subject");
            metadata.keywords = get_string_from_dict(info, b"Keywords");
            metadata.creator = get_string_from_dict(info, b"Creator");
            metadata.producer = get_string_from_dict(info, b"Producer");
            metadata.created = get_string_from_dict(info, b"CreationDate")
                .as_deref()
                .and_then(parse_pdf_date);
            metadata.modified = get_string_from_dict(info, b"ModDate")
                .as_deref()
                .and_then(parse_pdf_date);
        }
        metadata
    }
}

/// Look up a page attribute, following the Parent chain for inherited ones.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a LopdfDocument,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn stream_content(stream: &lopdf::Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    } else {
        stream.content.clone()
    }
}

impl DocumentEngine for LopdfBackend {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page(&self, number: u32) -> Result<PageInfo> {
        let page_id = self.page_id(number)?;
        let media_box = self.media_box(page_id);
        let rotation = self
            .inherited(page_id, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360) as i32;
        Ok(PageInfo {
            number,
            width: media_box.width(),
            height: media_box.height(),
            rotation,
        })
    }

    fn primitives(&self, number: u32) -> Result<Vec<GeometricPrimitive>> {
        let page_id = self.page_id(number)?;
        let content = self
            .page_content(page_id)
            .map_err(|e| Error::extraction(number, e.to_string()))?;
        let resources = self.resources(page_id);
        ContentInterpreter::new(&self.doc, self.media_box(page_id))
            .run(&content, resources)
            .map_err(|e| Error::extraction(number, e.to_string()))
    }

    fn image_data(&self, _number: u32, image: &ImageRef) -> Result<ImageData> {
        extract_image(&self.doc, parse_image_ref(image)?)
    }

    fn metadata(&self) -> Metadata {
        self.extract_metadata()
    }

    fn rasterize(&self, number: u32, redactions: &[Rect], scale: f32) -> Result<Raster> {
        let page = self.page(number)?;
        let primitives = self.primitives(number)?;
        rasterize(page.width, page.height, &primitives, redactions, scale, |image| {
            decode_image(&self.doc, parse_image_ref(image)?)
        })
    }

    fn copy_pages_into(&self, numbers: &[u32], writer: &mut PdfWriter) -> Result<()> {
        writer.import_pages(&self.doc, numbers)
    }
}

/// Helper to get a string from a PDF dictionary.
fn get_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            // UTF-16BE first (PDF standard for Unicode)
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                String::from_utf8(bytes.clone())
                    .ok()
                    .or_else(|| Some(bytes.iter().map(|&b| b as char).collect()))
            }
        }
        Object::Name(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

/// Parse a PDF date string (D:YYYYMMDDHHmmSSOHH'mm').
pub(crate) fn parse_pdf_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = s.strip_prefix("D:").unwrap_or(s);

    // At minimum we need YYYY
    if s.len() < 4 {
        return None;
    }

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(1);
    let day: u32 = s.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(1);
    let hour: u32 = s.get(8..10).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    fn sample_pdf() -> Vec<u8> {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("Title")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Rotate" => 90,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Sample"),
            "CreationDate" => Object::string_literal("D:20240115103045Z"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_inherited_page_attributes() {
        let backend = LopdfBackend::load_bytes(&sample_pdf()).unwrap();
        assert_eq!(backend.page_count(), 1);
        let page = backend.page(1).unwrap();
        assert_eq!((page.width, page.height, page.rotation), (595.0, 842.0, 90));
        assert!(matches!(backend.page(2), Err(Error::PageOutOfRange(2, 1))));
    }

    #[test]
    fn test_primitives_use_inherited_resources() {
        let backend = LopdfBackend::load_bytes(&sample_pdf()).unwrap();
        let prims = backend.primitives(1).unwrap();
        assert_eq!(prims.len(), 1);
        let GeometricPrimitive::Text(run) = &prims[0] else {
            panic!("expected text");
        };
        assert_eq!(run.text, "Title");
        assert_eq!(run.font_name, "Helvetica-Bold");
        assert_eq!(run.origin.y, 242.0);
        assert_ne!(run.flags & crate::model::style_bits::BOLD, 0);
    }

    #[test]
    fn test_metadata() {
        let backend = LopdfBackend::load_bytes(&sample_pdf()).unwrap();
        let metadata = backend.metadata();
        assert_eq!(metadata.title.as_deref(), Some("Sample"));
        assert_eq!(metadata.page_count, 1);
        assert_eq!(metadata.created.unwrap().year(), 2024);
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(LopdfBackend::load_bytes(b"not a pdf").is_err());
    }

    #[test]
    fn test_parse_pdf_date() {
        let date = parse_pdf_date("D:20240115103045").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 15));
        let date = parse_pdf_date("D:2024").unwrap();
        assert_eq!((date.month(), date.day()), (1, 1));
        assert!(parse_pdf_date("D:20").is_none());
    }
}
