//! Raw geometric primitives as supplied by a [`DocumentEngine`](crate::parser::DocumentEngine).
//!
//! All boxes are in native units (points) with a top-left origin.

use serde::{Deserialize, Serialize};

use super::{Point, Rect, Rgb};

/// Style bitmask bit positions.
pub mod style_bits {
    pub const SERIF: u32 = 1 << 0;
    pub const ITALIC: u32 = 1 << 1;
    pub const MONOSPACE: u32 = 1 << 3;
    pub const BOLD: u32 = 1 << 4;
    pub const SUPERSCRIPT: u32 = 1 << 5;
    pub const SUBSCRIPT: u32 = 1 << 6;
    pub const STRIKETHROUGH: u32 = 1 << 7;
}

/// A run of text shown with one font and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Decoded text
    pub text: String,
    /// Box from ascent (baseline minus size) down to the descender
    pub bbox: Rect,
    /// Font name as embedded (may carry a subset prefix)
    pub font_name: String,
    /// Effective font size in native units
    pub font_size: f32,
    /// Fill color
    pub color: Rgb,
    /// Style bitmask, see [`style_bits`]
    pub flags: u32,
    /// Baseline origin of the first glyph
    pub origin: Point,
}

/// Identifier of an image resource inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image drawn on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    pub image_ref: ImageRef,
    pub bbox: Rect,
    /// Sample width of the image
    pub pixel_width: u32,
    /// Sample height of the image
    pub pixel_height: u32,
    /// Bits per color component
    pub color_depth: u8,
}

/// One segment of a vector path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathItem {
    Line { from: Point, to: Point },
    Rect { rect: Rect },
    Quad { points: [Point; 4] },
    Curve { points: [Point; 4] },
}

impl PathItem {
    /// Every point of the item, control points included.
    pub fn points(&self) -> Vec<Point> {
        match self {
            PathItem::Line { from, to } => vec![*from, *to],
            PathItem::Rect { rect } => vec![
                Point::new(rect.x0, rect.y0),
                Point::new(rect.x1, rect.y1),
            ],
            PathItem::Quad { points } | PathItem::Curve { points } => points.to_vec(),
        }
    }
}

/// A painted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPath {
    pub bbox: Rect,
    pub items: Vec<PathItem>,
    pub stroke_color: Option<Rgb>,
    pub fill_color: Option<Rgb>,
    pub stroke_width: f32,
    pub opacity: f32,
    /// Fill with the even-odd rule
    pub even_odd: bool,
}

impl VectorPath {
    /// Bounding box of the item points, or `None` for an empty path.
    pub fn items_bbox(items: &[PathItem]) -> Option<Rect> {
        Rect::bounding(items.iter().flat_map(|i| i.points()))
    }
}

/// A primitive read from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometricPrimitive {
    Text(TextRun),
    Image(ImagePlacement),
    Path(VectorPath),
}

impl GeometricPrimitive {
    /// Box of the primitive.
    pub fn bbox(&self) -> Rect {
        match self {
            GeometricPrimitive::Text(t) => t.bbox,
            GeometricPrimitive::Image(i) => i.bbox,
            GeometricPrimitive::Path(p) => p.bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_bbox() {
        let items = vec![
            PathItem::Line {
                from: Point::new(10.0, 10.0),
                to: Point::new(50.0, 10.0),
            },
            PathItem::Rect {
                rect: Rect::new(0.0, 5.0, 20.0, 30.0),
            },
        ];
        assert_eq!(
            VectorPath::items_bbox(&items),
            Some(Rect::new(0.0, 5.0, 50.0, 30.0))
        );
        assert_eq!(VectorPath::items_bbox(&[]), None);
    }

    #[test]
    fn test_primitive_serializes_tagged() {
        let prim = GeometricPrimitive::Image(ImagePlacement {
            image_ref: ImageRef("12 0".into()),
            bbox: Rect::new(0.0, 0.0, 10.0, 10.0),
            pixel_width: 100,
            pixel_height: 100,
            color_depth: 8,
        });
        let json = serde_json::to_string(&prim).unwrap();
        assert!(json.contains("\"type\":\"image\""));
        assert!(json.contains("\"12 0\""));
    }
}
