//! Markup elements back to page placement commands.
//!
//! Every position is resolved to pixels (percentages against the page's
//! pixel size) and then converted to native units. Text placement is
//! baseline-anchored: the baseline sits at the element's `top` plus its
//! font size.

use std::fs;
use std::path::Path;

use crate::config::MissingPositionPolicy;
use crate::error::{Diagnostics, Error, Result};
use crate::markup::StyleParser;
use crate::model::{
    ImageSource, Length, MarkupElement, MarkupPage, MarkupPayload, MarkupTable, PathItem, Point,
    Rect, Rgb, ShapeStyle, TextStyle,
};
use crate::parser::ImageData;
use crate::units::CoordinateMapper;

/// Image size used when markup gives none, in pixels.
const DEFAULT_IMAGE_SIZE_PX: f32 = 100.0;

/// Line advance for multi-line text, as a multiple of the font size.
const LINE_SPACING: f32 = 1.2;

/// Text appearance in native units.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacementStyle {
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub monospace: bool,
    pub serif: bool,
    pub color: Rgb,
}

/// Shape appearance in native units.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePlacementStyle {
    pub stroke: Option<Rgb>,
    pub fill: Option<Rgb>,
    pub stroke_width: f32,
    pub opacity: f32,
}

/// One drawing instruction for the document writer. Native units, top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementCommand {
    /// Draw `content` with its baseline starting at `position`.
    PlaceText {
        position: Point,
        content: String,
        style: TextPlacementStyle,
    },
    /// Draw an image into the box at `position`.
    PlaceImage {
        position: Point,
        width: f32,
        height: f32,
        image: ImageData,
    },
    /// Draw a path; `path` is in absolute page coordinates.
    PlaceVector {
        position: Point,
        width: f32,
        height: f32,
        style: ShapePlacementStyle,
        path: Vec<PathItem>,
    },
}

impl PlacementCommand {
    pub fn is_text(&self) -> bool {
        matches!(self, PlacementCommand::PlaceText { .. })
    }
}

/// Placement commands for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub number: u32,
    /// Page width in native units
    pub width: f32,
    /// Page height in native units
    pub height: f32,
    /// `/Rotate` of the rebuilt page
    pub rotation: i32,
    pub commands: Vec<PlacementCommand>,
}

/// Resolved element box in native units.
#[derive(Debug, Clone, Copy)]
struct NativeBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    /// Same box in pixels, for element-local path data
    left_px: f32,
    top_px: f32,
}

/// Turns markup elements into placement commands.
pub struct ElementReconstructor {
    mapper: CoordinateMapper,
    parser: StyleParser,
    policy: MissingPositionPolicy,
}

impl ElementReconstructor {
    pub fn new(mapper: CoordinateMapper, policy: MissingPositionPolicy) -> Result<Self> {
        Ok(Self {
            mapper,
            parser: StyleParser::new()?,
            policy,
        })
    }

    /// Build the plan of one page.
    ///
    /// Elements are placed in stacking order. An element that cannot be
    /// placed is reported and skipped; the rest of the page continues.
    pub fn reconstruct_page(&self, page: &MarkupPage) -> (PagePlan, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut commands = Vec::with_capacity(page.elements.len() + 1);

        if let Some(background) = &page.background {
            match load_image(&background.source) {
                Ok(image) => commands.push(PlacementCommand::PlaceImage {
                    position: Point::new(0.0, 0.0),
                    width: page.width_native,
                    height: page.height_native,
                    image,
                }),
                Err(e) => diagnostics.page(
                    page.number,
                    Error::reconstruction(page.number, format!("background: {}", e)),
                ),
            }
        }

        let mut order: Vec<usize> = (0..page.elements.len()).collect();
        order.sort_by_key(|&i| page.elements[i].z_index);

        for i in order {
            match self.place(page, &page.elements[i]) {
                Ok(mut placed) => commands.append(&mut placed),
                Err(e) => diagnostics.element(page.number, i, e),
            }
        }

        let plan = PagePlan {
            number: page.number,
            width: page.width_native,
            height: page.height_native,
            rotation: page.rotation,
            commands,
        };
        (plan, diagnostics)
    }

    /// Placement commands of a single element.
    pub fn place(&self, page: &MarkupPage, element: &MarkupElement) -> Result<Vec<PlacementCommand>> {
        let native = self.resolve_box(page, element)?;

        match &element.payload {
            MarkupPayload::Text { content, style } => {
                let style = self.text_style(style)?;
                Ok(text_lines(content, native.x, native.y, style))
            }
            MarkupPayload::Image { source } => {
                let image = load_image(source)?;
                let (width, height) = self.image_size(element, native)?;
                Ok(vec![PlacementCommand::PlaceImage {
                    position: Point::new(native.x, native.y),
                    width,
                    height,
                    image,
                }])
            }
            MarkupPayload::Vector { style, path } => {
                let items = match path {
                    Some(data) => self.path_to_native(data, native)?,
                    None => Vec::new(),
                };
                let items = if items.is_empty() {
                    vec![PathItem::Rect {
                        rect: Rect::from_xywh(native.x, native.y, native.width, native.height),
                    }]
                } else {
                    items
                };
                Ok(vec![self.vector(native, style, items)?])
            }
            MarkupPayload::Line { style } => {
                let item = if style.stroke.is_some() {
                    // Stroked rule through the middle of its box, along the long axis.
                    let (from, to) = if native.width >= native.height {
                        let y = native.y + native.height / 2.0;
                        (Point::new(native.x, y), Point::new(native.x + native.width, y))
                    } else {
                        let x = native.x + native.width / 2.0;
                        (Point::new(x, native.y), Point::new(x, native.y + native.height))
                    };
                    PathItem::Line { from, to }
                } else {
                    PathItem::Rect {
                        rect: Rect::from_xywh(native.x, native.y, native.width, native.height),
                    }
                };
                Ok(vec![self.vector(native, style, vec![item])?])
            }
            MarkupPayload::Table(table) => self.table(page, table, native),
        }
    }

    fn missing(&self, what: &str) -> Result<Length> {
        match self.policy {
            MissingPositionPolicy::Skip => {
                Err(Error::Markup(format!("element has no '{}' position", what)))
            }
            MissingPositionPolicy::DefaultToOrigin => Ok(Length::px(0.0)),
        }
    }

    fn resolve_box(&self, page: &MarkupPage, element: &MarkupElement) -> Result<NativeBox> {
        let left = match element.left {
            Some(l) => l,
            None => self.missing("left")?,
        };
        let top = match element.top {
            Some(t) => t,
            None => self.missing("top")?,
        };

        let left_px = self.mapper.resolve_px(left, page.width_px)?;
        let top_px = self.mapper.resolve_px(top, page.height_px)?;
        let width = match element.width {
            Some(w) => self.mapper.normalize_dimension(w, page.width_px)?,
            None => 0.0,
        };
        let height = match element.height {
            Some(h) => self.mapper.normalize_dimension(h, page.height_px)?,
            None => 0.0,
        };

        Ok(NativeBox {
            x: self.mapper.coord_to_native(left_px)?,
            y: self.mapper.coord_to_native(top_px)?,
            width,
            height,
            left_px,
            top_px,
        })
    }

    fn image_size(&self, element: &MarkupElement, native: NativeBox) -> Result<(f32, f32)> {
        let fallback = self.mapper.to_native(DEFAULT_IMAGE_SIZE_PX)?;
        let width = match element.width {
            Some(_) if native.width > 0.0 => native.width,
            _ => fallback,
        };
        let height = match element.height {
            Some(_) if native.height > 0.0 => native.height,
            _ => fallback,
        };
        Ok((width, height))
    }

    fn color(&self, value: &str) -> Rgb {
        self.parser.color(value).unwrap_or(Rgb::BLACK)
    }

    fn text_style(&self, style: &TextStyle) -> Result<TextPlacementStyle> {
        Ok(TextPlacementStyle {
            font_family: style.font_family.clone(),
            font_size: self.mapper.to_native(style.font_size)?,
            bold: style.bold,
            italic: style.italic,
            underline: style.underline,
            strikethrough: style.strikethrough,
            monospace: style.monospace,
            serif: style.serif,
            color: self.color(&style.color),
        })
    }

    fn shape_style(&self, style: &ShapeStyle) -> Result<ShapePlacementStyle> {
        Ok(ShapePlacementStyle {
            stroke: style.stroke.as_deref().and_then(|c| self.parser.color(c)),
            fill: style.fill.as_deref().and_then(|c| self.parser.color(c)),
            stroke_width: self.mapper.to_native(style.stroke_width.max(0.0))?,
            opacity: style.opacity.clamp(0.0, 1.0),
        })
    }

    fn vector(&self, native: NativeBox, style: &ShapeStyle, path: Vec<PathItem>) -> Result<PlacementCommand> {
        let style = self.shape_style(style)?;
        if style.stroke.is_none() && style.fill.is_none() {
            return Err(Error::Markup("shape has neither stroke nor fill".to_string()));
        }
        Ok(PlacementCommand::PlaceVector {
            position: Point::new(native.x, native.y),
            width: native.width,
            height: native.height,
            style,
            path,
        })
    }

    fn path_to_native(&self, data: &str, native: NativeBox) -> Result<Vec<PathItem>> {
        let ratio = self.mapper.ratio();
        let map = |p: &Point| {
            Point::new(
                (native.left_px + p.x) / ratio,
                (native.top_px + p.y) / ratio,
            )
        };
        let items = self.parser.path(data)?;
        Ok(items
            .iter()
            .map(|item| match item {
                PathItem::Line { from, to } => PathItem::Line {
                    from: map(from),
                    to: map(to),
                },
                PathItem::Rect { rect } => {
                    let a = map(&Point::new(rect.x0, rect.y0));
                    let b = map(&Point::new(rect.x1, rect.y1));
                    PathItem::Rect {
                        rect: Rect::new(a.x, a.y, b.x, b.y),
                    }
                }
                PathItem::Quad { points } => PathItem::Quad {
                    points: points.map(|p| map(&p)),
                },
                PathItem::Curve { points } => PathItem::Curve {
                    points: points.map(|p| map(&p)),
                },
            })
            .collect())
    }

    fn table(&self, page: &MarkupPage, table: &MarkupTable, native: NativeBox) -> Result<Vec<PlacementCommand>> {
        let style = self.text_style(&table.style)?;
        let rows = table.rows.len().max(1) as f32;
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0).max(1) as f32;
        let cell_width = native.width / columns;
        let cell_height = native.height / rows;

        let mut commands = Vec::new();
        for (r, row) in table.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.text.trim().is_empty() {
                    continue;
                }
                let (x, top) = match (cell.left, cell.top) {
                    (Some(left), Some(top)) => (
                        self.mapper.coord_to_native(left)?,
                        self.mapper.coord_to_native(top)?,
                    ),
                    _ => (
                        native.x + c as f32 * cell_width,
                        native.y + r as f32 * cell_height,
                    ),
                };
                if x > page.width_native || top > page.height_native {
                    log::debug!("table cell '{}' lies outside the page", cell.text);
                }
                let mut style = style.clone();
                if let Some(size) = cell.font_size {
                    style.font_size = self.mapper.to_native(size)?;
                }
                commands.extend(text_lines(&cell.text, x, top, style));
            }
        }
        Ok(commands)
    }
}

/// One text command per line, first baseline at `top + font_size`.
fn text_lines(content: &str, x: f32, top: f32, style: TextPlacementStyle) -> Vec<PlacementCommand> {
    let size = style.font_size;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| PlacementCommand::PlaceText {
            position: Point::new(x, top + size + i as f32 * size * LINE_SPACING),
            content: line.to_string(),
            style: style.clone(),
        })
        .collect()
}

/// Fetch the bytes behind an image source.
pub fn load_image(source: &ImageSource) -> Result<ImageData> {
    match source {
        ImageSource::DataUri { mime, bytes } => Ok(ImageData {
            bytes: bytes.clone(),
            mime: mime.clone(),
        }),
        ImageSource::File { path } => {
            let bytes = fs::read(path)?;
            let mime = mime_for(path, &bytes);
            Ok(ImageData { bytes, mime })
        }
        ImageSource::Remote { url } => Err(Error::Markup(format!("remote image source skipped: {}", url))),
        ImageSource::Unresolved { image_ref } => Err(Error::Markup(format!(
            "image {} has no embedded bytes",
            image_ref
        ))),
    }
}

fn mime_for(path: &Path, bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg".to_string(),
        Ok(image::ImageFormat::Png) => "image/png".to_string(),
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => match path.extension().and_then(|e| e.to_str()) {
            Some("jpg" | "jpeg") => "image/jpeg".to_string(),
            _ => "image/png".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkupCell, MarkupKind};

    fn page(elements: Vec<MarkupElement>) -> MarkupPage {
        MarkupPage {
            number: 1,
            width_px: 816.0,
            height_px: 1056.0,
            width_native: 612.0,
            height_native: 792.0,
            rotation: 0,
            elements,
            background: None,
        }
    }

    fn text(left: Option<Length>, top: Option<Length>) -> MarkupElement {
        MarkupElement {
            kind: MarkupKind::Text,
            left,
            top,
            width: Some(Length::px(100.0)),
            height: Some(Length::px(20.0)),
            z_index: 1,
            payload: MarkupPayload::Text {
                content: "Hello".into(),
                style: TextStyle {
                    font_size: 16.0,
                    color: "#ff0000".into(),
                    ..TextStyle::default()
                },
            },
        }
    }

    fn assert_line(path: &[PathItem], from: Point, to: Point) {
        assert_eq!(path.len(), 1);
        let PathItem::Line { from: a, to: b } = path[0] else {
            panic!("expected a line, got {:?}", path[0]);
        };
        let close = |p: Point, q: Point| (p.x - q.x).abs() < 1e-3 && (p.y - q.y).abs() < 1e-3;
        assert!(close(a, from) && close(b, to), "{:?} -> {:?}", a, b);
    }

    fn reconstructor(policy: MissingPositionPolicy) -> ElementReconstructor {
        ElementReconstructor::new(CoordinateMapper::default(), policy).unwrap()
    }

    #[test]
    fn test_text_baseline_correction() {
        let r = reconstructor(MissingPositionPolicy::Skip);
        let commands = r
            .place(&page(vec![]), &text(Some(Length::px(96.0)), Some(Length::px(128.0))))
            .unwrap();
        let PlacementCommand::PlaceText { position, style, .. } = &commands[0] else {
            panic!("expected text");
        };
        assert!((position.x - 72.0).abs() < 1e-4);
        // top 96pt + 12pt font
        assert!((position.y - 108.0).abs() < 1e-4);
        assert!((style.font_size - 12.0).abs() < 1e-4);
        assert_eq!(style.color, Rgb::from_rgb8(255, 0, 0));
    }

    #[test]
    fn test_percent_positions() {
        let r = reconstructor(MissingPositionPolicy::Skip);
        let commands = r
            .place(&page(vec![]), &text(Some(Length::percent(50.0)), Some(Length::percent(25.0))))
            .unwrap();
        let PlacementCommand::PlaceText { position, .. } = &commands[0] else {
            panic!("expected text");
        };
        assert!((position.x - 306.0).abs() < 1e-3);
        assert!((position.y - (198.0 + 12.0)).abs() < 1e-3);
    }

    #[test]
    fn test_missing_position_policy() {
        let p = page(vec![text(None, Some(Length::px(10.0))), text(Some(Length::px(0.0)), Some(Length::px(0.0)))]);

        let (plan, diagnostics) = reconstructor(MissingPositionPolicy::Skip).reconstruct_page(&p);
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(diagnostics.len(), 1);

        let (plan, diagnostics) = reconstructor(MissingPositionPolicy::DefaultToOrigin).reconstruct_page(&p);
        assert_eq!(plan.commands.len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_line_and_vector() {
        let r = reconstructor(MissingPositionPolicy::Skip);
        let line = MarkupElement::positioned(
            MarkupKind::Line,
            0.0,
            100.0,
            200.0,
            0.0,
            MarkupPayload::Line {
                style: ShapeStyle {
                    stroke: Some("#000000".into()),
                    ..ShapeStyle::default()
                },
            },
        );
        let commands = r.place(&page(vec![]), &line).unwrap();
        let PlacementCommand::PlaceVector { path, style, .. } = &commands[0] else {
            panic!("expected vector");
        };
        assert_line(path, Point::new(0.0, 75.0), Point::new(150.0, 75.0));
        assert!((style.stroke_width - 0.75).abs() < 1e-4);

        let shape = MarkupElement::positioned(
            MarkupKind::Vector,
            40.0,
            40.0,
            40.0,
            20.0,
            MarkupPayload::Vector {
                style: ShapeStyle {
                    stroke: None,
                    fill: Some("#00ff00".into()),
                    ..ShapeStyle::default()
                },
                path: Some("M 0 0 L 40 20".into()),
            },
        );
        let commands = r.place(&page(vec![]), &shape).unwrap();
        let PlacementCommand::PlaceVector { path, .. } = &commands[0] else {
            panic!("expected vector");
        };
        assert_line(path, Point::new(30.0, 30.0), Point::new(60.0, 45.0));
    }

    #[test]
    fn test_table_cells() {
        let r = reconstructor(MissingPositionPolicy::Skip);
        let cell = |text: &str, anchor: Option<(f32, f32)>| MarkupCell {
            text: text.into(),
            left: anchor.map(|a| a.0),
            top: anchor.map(|a| a.1),
            font_size: None,
        };
        let table = MarkupElement::positioned(
            MarkupKind::Table,
            0.0,
            0.0,
            200.0,
            40.0,
            MarkupPayload::Table(MarkupTable {
                rows: vec![
                    vec![cell("A", Some((40.0, 40.0))), cell("", None)],
                    vec![
                        cell("C", None),
                        MarkupCell {
                            font_size: Some(24.0),
                            ..cell("D", None)
                        },
                    ],
                ],
                has_header: true,
                style: TextStyle::default(),
            }),
        );
        let commands = r.place(&page(vec![]), &table).unwrap();
        assert_eq!(commands.len(), 3);
        let positions: Vec<Point> = commands
            .iter()
            .map(|c| match c {
                PlacementCommand::PlaceText { position, .. } => *position,
                _ => panic!("expected text"),
            })
            .collect();
        // 16px font is 12pt
        assert!((positions[0].y - 42.0).abs() < 1e-3);
        assert!((positions[2].x - 75.0).abs() < 1e-3);
        assert!((positions[2].y - (15.0 + 18.0)).abs() < 1e-3);

        let sizes: Vec<f32> = commands
            .iter()
            .map(|c| match c {
                PlacementCommand::PlaceText { style, .. } => style.font_size,
                _ => panic!("expected text"),
            })
            .collect();
        // Cells without their own size inherit the table's 12pt, 24px is 18pt
        for (size, expected) in sizes.iter().zip([12.0, 12.0, 18.0]) {
            assert!((size - expected).abs() < 1e-3, "{} != {}", size, expected);
        }
    }

    #[test]
    fn test_images() {
        let r = reconstructor(MissingPositionPolicy::Skip);
        let mut image = MarkupElement::positioned(
            MarkupKind::Image,
            0.0,
            0.0,
            0.0,
            0.0,
            MarkupPayload::Image {
                source: ImageSource::DataUri {
                    mime: "image/png".into(),
                    bytes: vec![1, 2, 3],
                },
            },
        );
        image.width = None;
        image.height = None;
        let commands = r.place(&page(vec![]), &image).unwrap();
        let PlacementCommand::PlaceImage { width, height, .. } = &commands[0] else {
            panic!("expected image");
        };
        assert!((width - 75.0).abs() < 1e-4 && (height - 75.0).abs() < 1e-4);

        image.payload = MarkupPayload::Image {
            source: ImageSource::Remote {
                url: "https://example.com/x.png".into(),
            },
        };
        assert!(r.place(&page(vec![]), &image).is_err());
    }

    #[test]
    fn test_multiline_text() {
        let commands = text_lines(
            "one\n\nthree",
            0.0,
            0.0,
            TextPlacementStyle {
                font_family: "sans-serif".into(),
                font_size: 10.0,
                bold: false,
                italic: false,
                underline: false,
                strikethrough: false,
                monospace: false,
                serif: false,
                color: Rgb::BLACK,
            },
        );
        assert_eq!(commands.len(), 2);
        let PlacementCommand::PlaceText { position, .. } = &commands[1] else {
            panic!("expected text");
        };
        assert!((position.y - 34.0).abs() < 1e-4);
    }
}
