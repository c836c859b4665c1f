//! Classified page elements.

use serde::{Deserialize, Serialize};

use super::primitive::style_bits;
use super::{ImageRef, PathItem, Point, Rect, Rgb, TableRegion};
use crate::config::UnderlineSource;

/// Named style flags, decoded once from the style bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFlags {
    pub serif: bool,
    pub italic: bool,
    pub monospace: bool,
    pub bold: bool,
    pub superscript: bool,
    pub subscript: bool,
    pub strikethrough: bool,
    pub underline: bool,
}

impl StyleFlags {
    /// Decode a bitmask.
    pub fn decode(bits: u32, underline: UnderlineSource) -> Self {
        let has = |mask: u32| bits & mask != 0;
        let underline = match underline {
            UnderlineSource::None => false,
            UnderlineSource::MonospaceBit => has(style_bits::MONOSPACE),
            UnderlineSource::Bit(pos) if pos < 32 => has(1 << pos),
            UnderlineSource::Bit(_) => false,
        };
        Self {
            serif: has(style_bits::SERIF),
            italic: has(style_bits::ITALIC),
            monospace: has(style_bits::MONOSPACE),
            bold: has(style_bits::BOLD),
            superscript: has(style_bits::SUPERSCRIPT),
            subscript: has(style_bits::SUBSCRIPT),
            strikethrough: has(style_bits::STRIKETHROUGH),
            underline,
        }
    }
}

/// Visual style of a classified element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRecord {
    /// Web-safe font family
    pub font_family: String,
    /// Font size in native units
    pub font_size: f32,
    /// CSS weight (400 or 700)
    pub weight: u16,
    pub flags: StyleFlags,
    /// Text or stroke color
    pub color: Rgb,
    /// Shape fill color
    pub fill: Option<Rgb>,
    /// Stroke width in native units
    pub stroke_width: f32,
    pub opacity: f32,
}

impl StyleRecord {
    /// Color as a hex triplet.
    pub fn color_hex(&self) -> String {
        self.color.to_hex()
    }

    pub fn is_bold(&self) -> bool {
        self.weight >= 600
    }
}

impl Default for StyleRecord {
    fn default() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            font_size: 0.0,
            weight: 400,
            flags: StyleFlags::default(),
            color: Rgb::BLACK,
            fill: None,
            stroke_width: 0.0,
            opacity: 1.0,
        }
    }
}

/// Semantic role of an element, with its role-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKind {
    TextSpan {
        text: String,
        /// Baseline origin in native units
        origin: Point,
    },
    RasterImage {
        image_ref: ImageRef,
        pixel_width: u32,
        pixel_height: u32,
    },
    VectorShape {
        items: Vec<PathItem>,
        /// Stroke color, when the path is stroked
        stroke: Option<Rgb>,
        even_odd: bool,
    },
    Divider {
        items: Vec<PathItem>,
    },
    TableRegion(TableRegion),
}

impl ElementKind {
    /// Short name used as the markup discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::TextSpan { .. } => "text",
            ElementKind::RasterImage { .. } => "image",
            ElementKind::VectorShape { .. } => "vector",
            ElementKind::Divider { .. } => "line",
            ElementKind::TableRegion(_) => "table",
        }
    }
}

/// A primitive tagged with its semantic role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedElement {
    /// Page number (1-indexed)
    pub page: u32,
    /// Bounding box in native units
    pub bbox: Rect,
    /// Bounding box in markup pixels
    pub pixel_bbox: Rect,
    pub style: StyleRecord,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl ClassifiedElement {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ElementKind::TextSpan { .. })
    }

    /// Text of a span, if this is one.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::TextSpan { text, .. } => Some(text),
            _ => None,
        }
    }
}
