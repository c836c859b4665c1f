//! PDF output with lopdf.
//!
//! Pages are drawn from [`PlacementCommand`]s or copied verbatim from another
//! document. Text uses the standard 14 fonts with WinAnsi encoding, so no
//! font program is embedded.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use chrono::{DateTime, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};

use super::reconstructor::{PlacementCommand, ShapePlacementStyle, TextPlacementStyle};
use crate::error::{Error, Result};
use crate::model::{Metadata, PathItem, Point, Rgb};
use crate::parser::inherited_attribute;
use crate::render::fonts::{generic_family, GenericFamily};

/// Version written into new documents.
const PDF_VERSION: &str = "1.7";

/// Producer recorded in the document information dictionary.
const PRODUCER: &str = concat!("pagemark ", env!("CARGO_PKG_VERSION"));

/// Page attributes a page may inherit from the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Decoration line thickness as a fraction of the font size.
const DECORATION_WIDTH: f32 = 0.05;

/// Builds a PDF document page by page.
pub struct PdfWriter {
    doc: LopdfDocument,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    fonts: HashMap<&'static str, ObjectId>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Resources collected while drawing one page.
#[derive(Default)]
struct PageResources {
    fonts: BTreeMap<&'static str, ObjectId>,
    images: BTreeMap<String, ObjectId>,
    states: BTreeMap<String, ObjectId>,
}

impl PageResources {
    fn into_dictionary(self) -> Dictionary {
        let mut resources = Dictionary::new();
        let fonts = self.fonts.into_iter().map(|(name, id)| (name.to_string(), id));
        for (key, entries) in [
            ("Font", reference_dictionary(fonts)),
            ("XObject", reference_dictionary(self.images)),
            ("ExtGState", reference_dictionary(self.states)),
        ] {
            if !entries.is_empty() {
                resources.set(key, entries);
            }
        }
        resources
    }
}

fn reference_dictionary<I: IntoIterator<Item = (String, ObjectId)>>(entries: I) -> Dictionary {
    let mut dict = Dictionary::new();
    for (name, id) in entries {
        dict.set(name.into_bytes(), Object::Reference(id));
    }
    dict
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut doc = LopdfDocument::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            fonts: HashMap::new(),
        }
    }

    /// Number of pages written so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append an empty page.
    pub fn add_blank_page(&mut self, width: f32, height: f32) {
        let page = self.page_dictionary(width, height, 0, Dictionary::new(), None);
        let id = self.doc.add_object(page);
        self.kids.push(id);
    }

    /// Append a page drawn from placement commands, in order.
    pub fn add_page(&mut self, width: f32, height: f32, commands: &[PlacementCommand]) -> Result<()> {
        self.add_rotated_page(width, height, 0, commands)
    }

    /// Append a page that viewers turn by `rotation` degrees clockwise.
    ///
    /// Commands are in unrotated page space, as extraction reports them.
    /// Rotations that are not a multiple of 90 are rejected.
    pub fn add_rotated_page(
        &mut self,
        width: f32,
        height: f32,
        rotation: i32,
        commands: &[PlacementCommand],
    ) -> Result<()> {
        let rotation = rotation.rem_euclid(360);
        if rotation % 90 != 0 {
            return Err(Error::Assembly(format!("page rotation {} is not a quarter turn", rotation)));
        }
        let mut resources = PageResources::default();
        let mut operations = Vec::new();

        for command in commands {
            match command {
                PlacementCommand::PlaceText {
                    position,
                    content,
                    style,
                } => self.draw_text(height, *position, content, style, &mut resources, &mut operations),
                PlacementCommand::PlaceImage {
                    position,
                    width: w,
                    height: h,
                    image,
                } => {
                    let id = match self.embed_image(&image.bytes, &image.mime) {
                        Ok(id) => id,
                        Err(e) => {
                            log::warn!("skipping image on page {}: {}", self.kids.len() + 1, e);
                            continue;
                        }
                    };
                    let name = format!("Im{}", resources.images.len() + 1);
                    resources.images.insert(name.clone(), id);
                    operations.push(Operation::new("q", vec![]));
                    operations.push(Operation::new(
                        "cm",
                        vec![
                            (*w).into(),
                            0.into(),
                            0.into(),
                            (*h).into(),
                            position.x.into(),
                            (height - position.y - h).into(),
                        ],
                    ));
                    operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                    operations.push(Operation::new("Q", vec![]));
                }
                PlacementCommand::PlaceVector { style, path, .. } => {
                    self.draw_path(height, path, style, &mut resources, &mut operations);
                }
            }
        }

        let content = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));
        let resources = resources.into_dictionary();
        let page = self.page_dictionary(width, height, rotation, resources, Some(content_id));
        let id = self.doc.add_object(page);
        self.kids.push(id);
        Ok(())
    }

    /// Copy pages of `source` unchanged, in the order given.
    ///
    /// Inherited attributes are flattened onto each copied page and every
    /// object the page reaches is cloned once.
    pub fn import_pages(&mut self, source: &LopdfDocument, numbers: &[u32]) -> Result<()> {
        let pages = source.get_pages();
        let mut memo: HashMap<ObjectId, ObjectId> = HashMap::new();

        for &number in numbers {
            let page_id = *pages
                .get(&number)
                .ok_or(Error::PageOutOfRange(number, pages.len() as u32))?;
            let page = source.get_dictionary(page_id)?;

            let mut copy = self.clone_dictionary(source, page, &mut memo);
            for key in INHERITABLE {
                if copy.has(key) {
                    continue;
                }
                if let Some(value) = inherited_attribute(source, page_id, key) {
                    let value = self.clone_object(source, value, &mut memo);
                    copy.set(key.to_vec(), value);
                }
            }
            copy.set("Parent", Object::Reference(self.pages_id));

            let id = self.doc.add_object(copy);
            self.kids.push(id);
        }
        Ok(())
    }

    /// Write the document information dictionary.
    pub fn set_metadata(&mut self, metadata: &Metadata) {
        let mut info = Dictionary::new();
        let fields = [
            ("Title", &metadata.title),
            ("Author", &metadata.author),
            ("Subject", &metadata.subject),
            ("Keywords", &metadata.keywords),
            ("Creator", &metadata.creator),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                info.set(key, Object::String(text_string(value), StringFormat::Literal));
            }
        }
        info.set("Producer", Object::string_literal(PRODUCER));
        if let Some(created) = metadata.created {
            info.set("CreationDate", Object::string_literal(pdf_date(&created)));
        }
        info.set("ModDate", Object::string_literal(pdf_date(&Utc::now())));

        let info_id = self.doc.add_object(info);
        self.doc.trailer.set("Info", Object::Reference(info_id));
    }

    /// Close the page tree and serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.kids.is_empty() {
            return Err(Error::Assembly("document has no pages".to_string()));
        }

        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.kids.len() as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        log::debug!("wrote PDF with {} pages, {} bytes", self.kids.len(), output.len());
        Ok(output)
    }

    fn page_dictionary(
        &self,
        width: f32,
        height: f32,
        rotation: i32,
        resources: Dictionary,
        contents: Option<ObjectId>,
    ) -> Dictionary {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => resources,
        };
        if let Some(id) = contents {
            page.set("Contents", id);
        }
        if rotation != 0 {
            page.set("Rotate", rotation as i64);
        }
        page
    }

    fn font(&mut self, base_font: &'static str) -> ObjectId {
        if let Some(id) = self.fonts.get(base_font) {
            return *id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
            "Encoding" => "WinAnsiEncoding",
        });
        self.fonts.insert(base_font, id);
        id
    }

    fn draw_text(
        &mut self,
        page_height: f32,
        position: Point,
        content: &str,
        style: &TextPlacementStyle,
        resources: &mut PageResources,
        operations: &mut Vec<Operation>,
    ) {
        let base_font = base_font(style);
        let font_id = self.font(base_font);
        resources.fonts.insert(base_font, font_id);

        let size = style.font_size;
        let y = page_height - position.y;
        operations.push(fill_color(style.color));
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(base_font.as_bytes().to_vec()), size.into()],
        ));
        operations.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), position.x.into(), y.into()],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(content), StringFormat::Literal)],
        ));
        operations.push(Operation::new("ET", vec![]));

        let mut decorations = Vec::new();
        if style.underline {
            decorations.push(y - size * 0.12);
        }
        if style.strikethrough {
            decorations.push(y + size * 0.3);
        }
        if decorations.is_empty() {
            return;
        }
        let advance = content.chars().count() as f32 * size * average_advance(base_font);
        operations.push(stroke_color(style.color));
        operations.push(Operation::new("w", vec![(size * DECORATION_WIDTH).into()]));
        for line_y in decorations {
            operations.push(Operation::new("m", vec![position.x.into(), line_y.into()]));
            operations.push(Operation::new(
                "l",
                vec![(position.x + advance).into(), line_y.into()],
            ));
            operations.push(Operation::new("S", vec![]));
        }
    }

    fn draw_path(
        &mut self,
        page_height: f32,
        path: &[PathItem],
        style: &ShapePlacementStyle,
        resources: &mut PageResources,
        operations: &mut Vec<Operation>,
    ) {
        let paint = match (style.stroke.is_some(), style.fill.is_some()) {
            (true, true) => "B",
            (false, true) => "f",
            (true, false) => "S",
            (false, false) => return,
        };
        if path.is_empty() {
            return;
        }

        operations.push(Operation::new("q", vec![]));
        if style.opacity < 1.0 {
            let name = format!("GS{}", resources.states.len() + 1);
            let id = self.doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "ca" => style.opacity,
                "CA" => style.opacity,
            });
            resources.states.insert(name.clone(), id);
            operations.push(Operation::new("gs", vec![Object::Name(name.into_bytes())]));
        }
        if let Some(color) = style.stroke {
            operations.push(stroke_color(color));
            operations.push(Operation::new("w", vec![style.stroke_width.into()]));
        }
        if let Some(color) = style.fill {
            operations.push(fill_color(color));
        }

        let flip = |p: &Point| -> Vec<Object> { vec![p.x.into(), (page_height - p.y).into()] };
        let mut current: Option<Point> = None;
        for item in path {
            match item {
                PathItem::Line { from, to } => {
                    if current != Some(*from) {
                        operations.push(Operation::new("m", flip(from)));
                    }
                    operations.push(Operation::new("l", flip(to)));
                    current = Some(*to);
                }
                PathItem::Rect { rect } => {
                    operations.push(Operation::new(
                        "re",
                        vec![
                            rect.x0.into(),
                            (page_height - rect.y1).into(),
                            rect.width().into(),
                            rect.height().into(),
                        ],
                    ));
                    current = None;
                }
                PathItem::Curve { points } => {
                    if current != Some(points[0]) {
                        operations.push(Operation::new("m", flip(&points[0])));
                    }
                    let mut operands = flip(&points[1]);
                    operands.extend(flip(&points[2]));
                    operands.extend(flip(&points[3]));
                    operations.push(Operation::new("c", operands));
                    current = Some(points[3]);
                }
                PathItem::Quad { points } => {
                    operations.push(Operation::new("m", flip(&points[0])));
                    for p in &points[1..] {
                        operations.push(Operation::new("l", flip(p)));
                    }
                    operations.push(Operation::new("h", vec![]));
                    current = None;
                }
            }
        }
        operations.push(Operation::new(paint, vec![]));
        operations.push(Operation::new("Q", vec![]));
    }

    /// Add an image XObject. JPEG data with gray or RGB samples is passed
    /// through; anything else is decoded and stored as flate RGB with an
    /// alpha soft mask when needed.
    fn embed_image(&mut self, bytes: &[u8], mime: &str) -> Result<ObjectId> {
        let decoded = image::load_from_memory(bytes)?;
        let (width, height) = (decoded.width() as i64, decoded.height() as i64);

        if mime == "image/jpeg" {
            let color_space = match decoded.color() {
                image::ColorType::L8 => Some("DeviceGray"),
                image::ColorType::Rgb8 => Some("DeviceRGB"),
                _ => None,
            };
            if let Some(color_space) = color_space {
                let mut stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "ColorSpace" => color_space,
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    bytes.to_vec(),
                );
                stream.allows_compression = false;
                return Ok(self.doc.add_object(stream));
            }
        }

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if alpha.iter().any(|&a| a < u8::MAX) {
            let mask = flate_stream(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                &alpha,
            )?;
            let mask_id = self.doc.add_object(mask);
            dict.set("SMask", mask_id);
        }
        let stream = flate_stream(dict, &rgb)?;
        Ok(self.doc.add_object(stream))
    }

    fn clone_dictionary(
        &mut self,
        source: &LopdfDocument,
        dict: &Dictionary,
        memo: &mut HashMap<ObjectId, ObjectId>,
    ) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            // The page tree is rebuilt, so back references are not followed.
            if key == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.clone_object(source, value, memo));
        }
        copy
    }

    fn clone_object(
        &mut self,
        source: &LopdfDocument,
        object: &Object,
        memo: &mut HashMap<ObjectId, ObjectId>,
    ) -> Object {
        match object {
            Object::Reference(id) => {
                if let Some(new_id) = memo.get(id) {
                    return Object::Reference(*new_id);
                }
                let Ok(target) = source.get_object(*id) else {
                    log::warn!("dangling reference {} {} replaced by null", id.0, id.1);
                    return Object::Null;
                };
                // Reserve the id first so cycles resolve to it.
                let new_id = self.doc.new_object_id();
                memo.insert(*id, new_id);
                let copy = self.clone_object(source, target, memo);
                self.doc.objects.insert(new_id, copy);
                Object::Reference(new_id)
            }
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dictionary(source, dict, memo)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_object(source, item, memo))
                    .collect(),
            ),
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(source, &stream.dict, memo);
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression && !stream.dict.has(b"Filter");
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }
}

/// A stream holding `data` with FlateDecode applied.
fn flate_stream(mut dict: Dictionary, data: &[u8]) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    dict.set("Filter", "FlateDecode");
    let mut stream = Stream::new(dict, compressed);
    stream.allows_compression = false;
    Ok(stream)
}

/// Standard 14 font for a text style.
fn base_font(style: &TextPlacementStyle) -> &'static str {
    let family = if style.monospace {
        GenericFamily::Monospace
    } else if style.serif {
        GenericFamily::Serif
    } else {
        generic_family(&style.font_family)
    };
    match (family, style.bold, style.italic) {
        (GenericFamily::SansSerif, false, false) => "Helvetica",
        (GenericFamily::SansSerif, true, false) => "Helvetica-Bold",
        (GenericFamily::SansSerif, false, true) => "Helvetica-Oblique",
        (GenericFamily::SansSerif, true, true) => "Helvetica-BoldOblique",
        (GenericFamily::Serif, false, false) => "Times-Roman",
        (GenericFamily::Serif, true, false) => "Times-Bold",
        (GenericFamily::Serif, false, true) => "Times-Italic",
        (GenericFamily::Serif, true, true) => "Times-BoldItalic",
        (GenericFamily::Monospace, false, false) => "Courier",
        (GenericFamily::Monospace, true, false) => "Courier-Bold",
        (GenericFamily::Monospace, false, true) => "Courier-Oblique",
        (GenericFamily::Monospace, true, true) => "Courier-BoldOblique",
    }
}

/// Rough glyph advance as a fraction of the font size.
fn average_advance(base_font: &str) -> f32 {
    if base_font.starts_with("Courier") {
        0.6
    } else if base_font.starts_with("Times") {
        0.45
    } else {
        0.5
    }
}

fn fill_color(color: Rgb) -> Operation {
    Operation::new("rg", vec![color.r.into(), color.g.into(), color.b.into()])
}

fn stroke_color(color: Rgb) -> Operation {
    Operation::new("RG", vec![color.r.into(), color.g.into(), color.b.into()])
}

/// Encode text for a WinAnsi font. Unmappable characters become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// PDF text string: ASCII as is, anything else as UTF-16BE with a BOM.
fn text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}
