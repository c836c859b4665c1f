//! Edited markup back to markup pages.
//!
//! Editor-only nodes are removed first. Page containers are located by
//! class, then by id pattern, and as a last resort the whole body is one
//! page. Inside a container every node with a `data-kind`, every `img` and
//! `table`, and every absolutely positioned node is an element candidate;
//! candidates nested inside another candidate belong to it.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::{DateTime, Utc};

use super::style::{is_bold_weight, InlineStyle, StyleParser};
use super::tree::{MarkupNode, MarkupTree};
use crate::error::{Diagnostics, Error, Result};
use crate::model::{
    BackgroundLayer, ImageRef, ImageSource, MarkupCell, MarkupElement, MarkupKind,
    MarkupPage, MarkupPayload, MarkupTable, Metadata, PageInfo, ShapeStyle, TextStyle, Unit,
};
use crate::render::fonts::{generic_family, GenericFamily};
use crate::render::{BACKGROUND_KIND, PAGE_CONTAINER_CLASS};
use crate::units::CoordinateMapper;

/// Nodes that exist only for the editor and never describe page content.
pub const CLEANUP_SELECTORS: &[&str] = &[
    ".pdf-page-break-marker",
    ".page-marker",
    ".toolbar",
    ".instructions",
    ".delete-btn",
    ".no-print",
    "script",
];

/// Default font size when markup omits one, in pixels.
const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

/// Pages and metadata read from a markup document.
#[derive(Debug, Clone, Default)]
pub struct MarkupDocument {
    pub pages: Vec<MarkupPage>,
    pub metadata: Metadata,
}

/// Reads markup trees written by [`to_html`](crate::render::to_html) or edited by hand.
pub struct MarkupReader {
    mapper: CoordinateMapper,
    parser: StyleParser,
    base_dir: Option<PathBuf>,
}

impl MarkupReader {
    pub fn new(mapper: CoordinateMapper) -> Result<Self> {
        Ok(Self {
            mapper,
            parser: StyleParser::new()?,
            base_dir: None,
        })
    }

    /// Resolve relative image paths against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Read every page of `tree`. The tree is cleaned in place.
    pub fn read<T: MarkupTree>(&self, tree: &mut T) -> Result<(MarkupDocument, Diagnostics)> {
        let removed = tree.remove(&CLEANUP_SELECTORS.join(", "))?;
        if removed > 0 {
            log::debug!("removed {} editor-only nodes", removed);
        }

        let mut diagnostics = Diagnostics::new();
        let metadata = self.read_metadata(&*tree);
        let containers = self.page_containers(&*tree)?;

        let mut pages = Vec::with_capacity(containers.len());
        for (i, container) in containers.iter().enumerate() {
            let number = container
                .attr("data-page-number")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(i as u32 + 1);
            match self.read_page(&*tree, container, number, &mut diagnostics) {
                Ok(page) => pages.push(page),
                Err(e) => diagnostics.page(number, e),
            }
        }

        log::info!("read {} pages from markup", pages.len());
        Ok((MarkupDocument { pages, metadata }, diagnostics))
    }

    fn read_metadata<T: MarkupTree>(&self, tree: &T) -> Metadata {
        let mut metadata = Metadata::default();
        for name in ["title", "author", "subject", "keywords", "creator", "producer"] {
            if let Some(value) = tree.meta(name) {
                metadata.set_text_field(name, value);
            }
        }
        if let Some(version) = tree.meta("pdf-version") {
            metadata.pdf_version = version;
        }
        let date = |name: &str| -> Option<DateTime<Utc>> {
            let value = tree.meta(name)?;
            DateTime::parse_from_rfc3339(value.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc))
        };
        metadata.created = date("created");
        metadata.modified = date("modified");
        metadata
    }

    fn page_containers<'t, T: MarkupTree + 't>(&self, tree: &'t T) -> Result<Vec<T::Node<'t>>> {
        let by_class = tree.select(&format!(".{}", PAGE_CONTAINER_CLASS))?;
        if !by_class.is_empty() {
            return Ok(outermost(by_class));
        }

        let by_id = tree.select("[id*=\"page-container\"], [id*=\"pdf-page\"]")?;
        if !by_id.is_empty() {
            log::debug!("no page container class, using {} id matches", by_id.len());
            return Ok(outermost(by_id));
        }

        log::debug!("no page containers, reading the body as one page");
        Ok(tree.body().into_iter().collect())
    }

    /// Native page size of a container.
    fn page_size<'t, T: MarkupTree + 't>(&self, tree: &'t T, container: &T::Node<'t>) -> (f32, f32) {
        let attr = |name: &str| -> Option<f32> {
            container
                .attr(name)
                .and_then(|v| v.trim().parse::<f32>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
        };
        if let (Some(w), Some(h)) = (attr("data-page-width"), attr("data-page-height")) {
            return (w, h);
        }

        let meta = |name: &str| -> Option<f32> {
            tree.meta(name)
                .and_then(|v| v.trim().parse::<f32>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
        };
        if let (Some(w), Some(h)) = (meta("page-width"), meta("page-height")) {
            return (w, h);
        }

        let style = InlineStyle::parse(container.attr("style").unwrap_or_default());
        let px = |name: &str| -> Option<f32> {
            let length = self.parser.length(style.get(name)?)?;
            let px = match length.unit {
                Unit::Px => length.value,
                Unit::Pt => length.value * self.mapper.ratio(),
                Unit::Percent => return None,
            };
            self.mapper.to_native(px).ok().filter(|v| *v > 0.0)
        };
        if let (Some(w), Some(h)) = (px("width"), px("height")) {
            return (w, h);
        }

        let a4 = PageInfo::a4(1);
        (a4.width, a4.height)
    }

    fn read_page<'t, T: MarkupTree + 't>(
        &self,
        tree: &'t T,
        container: &T::Node<'t>,
        number: u32,
        diagnostics: &mut Diagnostics,
    ) -> Result<MarkupPage> {
        let (width_native, height_native) = self.page_size(tree, container);
        let mut page = MarkupPage {
            number,
            width_px: self.mapper.to_markup_units(width_native)?,
            height_px: self.mapper.to_markup_units(height_native)?,
            width_native,
            height_native,
            rotation: page_rotation(container),
            elements: Vec::new(),
            background: None,
        };

        let mut candidates: Vec<T::Node<'t>> = Vec::new();
        for node in container.select_within("*")? {
            if node.attr("data-kind") == Some(BACKGROUND_KIND) {
                if page.background.is_none() {
                    match self.image_source(&node) {
                        Ok(source) => {
                            page.background = Some(BackgroundLayer {
                                source,
                                raster_width: 0,
                                raster_height: 0,
                            })
                        }
                        Err(e) => diagnostics.page(number, e),
                    }
                }
                continue;
            }
            if !self.is_candidate(&node) {
                continue;
            }
            if candidates.iter().any(|outer| node.is_inside(outer)) {
                continue;
            }
            candidates.push(node);
        }

        for (index, node) in candidates.iter().enumerate() {
            match self.read_element(node, index) {
                Ok(Some(element)) => page.elements.push(element),
                Ok(None) => {}
                Err(e) => diagnostics.element(number, index, e),
            }
        }

        log::debug!(
            "page {}: {} markup elements from {} candidates",
            number,
            page.elements.len(),
            candidates.len()
        );
        Ok(page)
    }

    fn is_candidate<N: MarkupNode>(&self, node: &N) -> bool {
        if node.attr("data-kind").is_some() || matches!(node.tag(), "img" | "table") {
            return true;
        }
        let style = InlineStyle::parse(node.attr("style").unwrap_or_default());
        style
            .get("position")
            .is_some_and(|p| p.eq_ignore_ascii_case("absolute"))
    }

    fn infer_kind<N: MarkupNode>(&self, node: &N, style: &InlineStyle) -> Option<MarkupKind> {
        if let Some(kind) = node.attr("data-kind").and_then(MarkupKind::parse) {
            return Some(kind);
        }
        match node.tag() {
            "img" => Some(MarkupKind::Image),
            "table" => Some(MarkupKind::Table),
            "hr" => Some(MarkupKind::Line),
            _ if !node.text().trim().is_empty() => Some(MarkupKind::Text),
            _ if style.get("border").is_some()
                || style.get("background-color").is_some()
                || style.get("background").is_some() =>
            {
                Some(MarkupKind::Vector)
            }
            _ => None,
        }
    }

    /// Read one candidate. `Ok(None)` means the node describes nothing.
    pub fn read_element<N: MarkupNode>(&self, node: &N, index: usize) -> Result<Option<MarkupElement>> {
        let style = InlineStyle::parse(node.attr("style").unwrap_or_default());
        let Some(kind) = self.infer_kind(node, &style) else {
            log::debug!("skipping <{}> without a recognizable kind", node.tag());
            return Ok(None);
        };

        let length = |name: &str| style.get(name).and_then(|v| self.parser.length(v));
        let attr_px = |name: &str| {
            node.attr(name)
                .and_then(|v| self.parser.length(v))
                .filter(|l| l.unit != Unit::Percent)
        };

        let mut left = length("left");
        let mut top = length("top");
        let mut width = length("width");
        let mut height = length("height");
        if kind == MarkupKind::Image {
            left = left.or_else(|| attr_px("data-x"));
            top = top.or_else(|| attr_px("data-y"));
            width = width.or_else(|| attr_px("width"));
            height = height.or_else(|| attr_px("height"));
        }

        let z_index = style
            .get("z-index")
            .and_then(|z| z.trim().parse().ok())
            .unwrap_or(index as i32 + 1);

        let payload = match kind {
            MarkupKind::Text => {
                let content = node.text();
                if content.trim().is_empty() {
                    return Ok(None);
                }
                MarkupPayload::Text {
                    content,
                    style: self.text_style(&style),
                }
            }
            MarkupKind::Image => MarkupPayload::Image {
                source: self.image_source(node)?,
            },
            MarkupKind::Vector => MarkupPayload::Vector {
                style: self.shape_style(&style, &["border", "border-color"]),
                path: node.attr("data-path").map(str::to_string),
            },
            MarkupKind::Line => MarkupPayload::Line {
                style: self.shape_style(&style, &["border-top", "border", "border-left", "border-color"]),
            },
            MarkupKind::Table => MarkupPayload::Table(self.table(node, &style)?),
        };

        Ok(Some(MarkupElement {
            kind,
            left,
            top,
            width,
            height,
            z_index,
            payload,
        }))
    }

    fn text_style(&self, style: &InlineStyle) -> TextStyle {
        let family = style
            .get("font-family")
            .map(|f| f.to_string())
            .unwrap_or_else(|| TextStyle::default().font_family);
        let font_size = style
            .get("font-size")
            .and_then(|v| self.parser.font_size(v))
            .map(|l| match l.unit {
                Unit::Pt => l.value * self.mapper.ratio(),
                _ => l.value,
            })
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_FONT_SIZE_PX);
        let decoration = style
            .get("text-decoration")
            .or_else(|| style.get("text-decoration-line"))
            .unwrap_or_default()
            .to_ascii_lowercase();
        let italic = style
            .get("font-style")
            .is_some_and(|s| s.contains("italic") || s.contains("oblique"));
        let vertical = style.get("vertical-align").unwrap_or_default();
        let generic = generic_family(&family);

        TextStyle {
            font_size,
            bold: style.get("font-weight").is_some_and(is_bold_weight),
            italic,
            underline: decoration.contains("underline"),
            strikethrough: decoration.contains("line-through"),
            monospace: generic == GenericFamily::Monospace,
            serif: generic == GenericFamily::Serif,
            superscript: vertical.eq_ignore_ascii_case("super"),
            subscript: vertical.eq_ignore_ascii_case("sub"),
            color: style
                .get("color")
                .and_then(|c| self.parser.color(c))
                .map(|c| c.to_hex())
                .unwrap_or_else(|| TextStyle::default().color),
            font_family: family,
        }
    }

    fn shape_style(&self, style: &InlineStyle, border_properties: &[&str]) -> ShapeStyle {
        let mut shape = ShapeStyle {
            stroke: None,
            fill: None,
            stroke_width: 0.0,
            opacity: 1.0,
        };

        for property in border_properties {
            let Some(value) = style.get(property) else {
                continue;
            };
            let (width, color) = self.parser.border(value);
            if let Some(color) = color {
                shape.stroke = Some(color.to_hex());
                shape.stroke_width = width.unwrap_or(1.0);
                break;
            }
        }

        shape.fill = style
            .get("background-color")
            .or_else(|| style.get("background"))
            .and_then(|v| self.parser.color(v))
            .map(|c| c.to_hex());
        shape.opacity = style
            .get("opacity")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        shape
    }

    fn image_source<N: MarkupNode>(&self, node: &N) -> Result<ImageSource> {
        let Some(src) = node.attr("src").map(str::trim).filter(|s| !s.is_empty()) else {
            return match node.attr("data-image-ref") {
                Some(image_ref) => Ok(ImageSource::Unresolved {
                    image_ref: ImageRef(image_ref.to_string()),
                }),
                None => Err(Error::Markup("image without a source".to_string())),
            };
        };

        if let Some(rest) = src.strip_prefix("data:") {
            return decode_data_uri(rest);
        }
        let lower = src.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Err(Error::Markup(format!("remote image source skipped: {}", src)));
        }

        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        let path = match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        Ok(ImageSource::File { path })
    }

    fn table<N: MarkupNode>(&self, node: &N, style: &InlineStyle) -> Result<MarkupTable> {
        let coord = |cell: &N, name: &str| -> Option<f32> {
            cell.attr(name)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
                .filter(|v| v.is_finite())
        };

        let mut rows = Vec::new();
        let mut has_header = false;
        for (r, row) in node.select_within("tr")?.iter().enumerate() {
            let cells = row.select_within("th, td")?;
            if r == 0 {
                has_header = cells.iter().any(|c| c.tag() == "th");
            }
            rows.push(
                cells
                    .iter()
                    .map(|cell| MarkupCell {
                        text: cell.text().trim().to_string(),
                        left: coord(cell, "data-left"),
                        top: coord(cell, "data-top"),
                        font_size: coord(cell, "data-font-size").filter(|s| *s > 0.0),
                    })
                    .collect(),
            );
        }

        Ok(MarkupTable {
            rows,
            has_header,
            style: self.text_style(style),
        })
    }
}

/// Quarter-turn rotation of a page container, 0 when absent or not a multiple of 90.
fn page_rotation<N: MarkupNode>(container: &N) -> i32 {
    container
        .attr("data-page-rotation")
        .and_then(|v| v.trim().parse::<i32>().ok())
        .map(|r| r.rem_euclid(360))
        .filter(|r| r % 90 == 0)
        .unwrap_or(0)
}

/// Keep only nodes that are not nested inside another node of the list.
fn outermost<N: MarkupNode>(nodes: Vec<N>) -> Vec<N> {
    let mut kept: Vec<N> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !kept.iter().any(|outer| node.is_inside(outer)) {
            kept.push(node);
        }
    }
    kept
}

/// Decode the part of a data URI after `data:`.
fn decode_data_uri(rest: &str) -> Result<ImageSource> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Markup("malformed data URI".to_string()))?;
    let mut parts = header.split(';');
    let mime = parts.next().filter(|m| !m.is_empty()).unwrap_or("image/png");
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(Error::Markup("only base64 data URIs are supported".to_string()));
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Markup(format!("invalid base64 image data: {}", e)))?;
    Ok(ImageSource::DataUri {
        mime: mime.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::HtmlTree;
    use crate::model::Length;

    fn read(html: &str) -> (MarkupDocument, Diagnostics) {
        let reader = MarkupReader::new(CoordinateMapper::default()).unwrap();
        reader.read(&mut HtmlTree::parse(html)).unwrap()
    }

    #[test]
    fn test_reads_generated_page() {
        let html = r#"<html><head>
            <meta name="title" content="Quarterly">
            <meta name="created" content="2024-01-15T10:30:45+00:00">
            </head><body>
            <div class="toolbar"><span style="position: absolute; left: 1px; top: 1px;">Save</span></div>
            <div class="pdf-page-container" data-page-number="1" data-page-width="612.00" data-page-height="792.00" style="width: 816px; height: 1056px;">
              <div class="pdf-element pdf-text" data-kind="text" contenteditable="true" style="position: absolute; left: 96.00px; top: 100.00px; width: 200px; height: 19.2px; z-index: 4; font-family: &#39;Times New Roman&#39;, Times, serif; font-size: 12pt; font-weight: bold; text-decoration: underline; color: #ff0000;">Hello <b>there</b></div>
              <div class="pdf-element pdf-line" data-kind="line" style="position: absolute; left: 10px; top: 50%; width: 100px; height: 0px; z-index: 2; border-top: 1.33px solid #808080;"></div>
            </div></body></html>"#;
        let (doc, diagnostics) = read(html);
        assert!(diagnostics.is_empty());
        assert_eq!(doc.metadata.title.as_deref(), Some("Quarterly"));
        assert!(doc.metadata.created.is_some());
        assert_eq!(doc.pages.len(), 1);

        let page = &doc.pages[0];
        assert_eq!((page.width_native, page.height_native), (612.0, 792.0));
        assert_eq!(page.elements.len(), 2);

        let text = &page.elements[0];
        assert_eq!(text.text(), Some("Hello there"));
        assert_eq!(text.z_index, 4);
        let MarkupPayload::Text { style, .. } = &text.payload else {
            panic!("expected text");
        };
        assert!((style.font_size - 16.0).abs() < 1e-4);
        assert!(style.bold && style.underline && style.serif && !style.italic);
        assert_eq!(style.color, "#ff0000");

        let line = &page.elements[1];
        assert_eq!(line.kind, MarkupKind::Line);
        assert_eq!(line.top, Some(Length::percent(50.0)));
        let MarkupPayload::Line { style } = &line.payload else {
            panic!("expected line");
        };
        assert_eq!(style.stroke.as_deref(), Some("#808080"));
    }

    #[test]
    fn test_container_fallbacks() {
        let by_id = r#"<body><div id="pdf-page-1" style="width: 400px; height: 300px;"><p style="position:absolute;left:1px;top:2px">A</p></div>
                       <div id="pdf-page-2"><p style="position:absolute;left:1px;top:2px">B</p></div></body>"#;
        let (doc, _) = read(by_id);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!((doc.pages[0].width_native, doc.pages[0].height_native), (300.0, 225.0));
        assert_eq!((doc.pages[1].width_native, doc.pages[1].height_native), (595.0, 842.0));
        assert_eq!(doc.pages[1].number, 2);

        let bare = r#"<body><div style="position: absolute; left: 5px; top: 5px;">Loose</div></body>"#;
        let (doc, _) = read(bare);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].elements[0].text(), Some("Loose"));
    }

    #[test]
    fn test_images() {
        let html = r#"<div class="pdf-page-container">
            <img data-kind="image" src="data:image/png;base64,AQID" style="position:absolute;left:0px;top:0px;width:10px;height:10px">
            <img src="assets/p1_img0.png" data-x="20" data-y="30" width="40" height="50">
            <img src="https://example.com/a.png" style="position:absolute;left:0;top:0">
            <img data-kind="background" src="bg.png">
        </div>"#;
        let reader = MarkupReader::new(CoordinateMapper::default())
            .unwrap()
            .with_base_dir("/tmp/out");
        let (doc, diagnostics) = reader.read(&mut HtmlTree::parse(html)).unwrap();
        let page = &doc.pages[0];

        assert_eq!(page.elements.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.iter().next().unwrap().error.to_string().contains("remote"));

        let MarkupPayload::Image { source } = &page.elements[0].payload else {
            panic!("expected image");
        };
        assert_eq!(
            source,
            &ImageSource::DataUri {
                mime: "image/png".into(),
                bytes: vec![1, 2, 3]
            }
        );

        let second = &page.elements[1];
        assert_eq!(second.left, Some(Length::px(20.0)));
        assert_eq!(second.height, Some(Length::px(50.0)));
        let MarkupPayload::Image { source } = &second.payload else {
            panic!("expected image");
        };
        assert_eq!(
            source,
            &ImageSource::File {
                path: PathBuf::from("/tmp/out/assets/p1_img0.png")
            }
        );

        let background = page.background.as_ref().unwrap();
        assert_eq!(
            background.source,
            ImageSource::File {
                path: PathBuf::from("/tmp/out/bg.png")
            }
        );
    }

    #[test]
    fn test_table() {
        let html = r#"<div class="pdf-page-container">
            <table data-kind="table" style="position:absolute;left:10px;top:20px;width:100px;height:40px;font-size:10px">
              <thead><tr><th data-left="10.00" data-top="20.00">Name</th><th>Qty</th></tr></thead>
              <tbody><tr><td data-left="10.00" data-top="40.00" data-font-size="13.33"> Bolts </td><td data-font-size="-2">x</td></tr></tbody>
            </table></div>"#;
        let (doc, _) = read(html);
        let MarkupPayload::Table(table) = &doc.pages[0].elements[0].payload else {
            panic!("expected table");
        };
        assert!(table.has_header);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0].text, "Bolts");
        assert_eq!(table.rows[1][0].top, Some(40.0));
        assert_eq!(table.rows[0][1].left, None);
        assert_eq!(table.rows[1][0].font_size, Some(13.33));
        assert_eq!(table.rows[0][0].font_size, None);
        assert_eq!(table.rows[1][1].font_size, None);
        assert_eq!(table.style.font_size, 10.0);
    }

    #[test]
    fn test_page_rotation() {
        let html = r#"<div class="pdf-page-container" data-page-rotation="-90"></div>
                      <div class="pdf-page-container" data-page-rotation="45"></div>
                      <div class="pdf-page-container"></div>"#;
        let (doc, _) = read(html);
        let rotations: Vec<i32> = doc.pages.iter().map(|p| p.rotation).collect();
        assert_eq!(rotations, vec![270, 0, 0]);
    }

    #[test]
    fn test_missing_position_is_kept_for_policy() {
        let html = r#"<div class="pdf-page-container"><div data-kind="text">No position</div></div>"#;
        let (doc, _) = read(html);
        let element = &doc.pages[0].elements[0];
        assert_eq!(element.left, None);
        assert_eq!(element.top, None);
    }
}
