//! Absolutely positioned markup elements.
//!
//! This is the boundary between extraction and reconstruction. Every
//! position and size in this module is in markup pixels (or a percentage
//! of the page), never in native units. Colors are hex strings.

use std::fmt;
use std::path::PathBuf;

use base64::Engine as _;
use serde::{Serialize, Serializer};

use super::ImageRef;

/// Unit of a markup length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Px,
    Percent,
    Pt,
}

/// A length as written in markup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Length {
    pub value: f32,
    pub unit: Unit,
}

impl Length {
    pub fn px(value: f32) -> Self {
        Self {
            value,
            unit: Unit::Px,
        }
    }

    pub fn percent(value: f32) -> Self {
        Self {
            value,
            unit: Unit::Percent,
        }
    }

    pub fn pt(value: f32) -> Self {
        Self {
            value,
            unit: Unit::Pt,
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            Unit::Px => "px",
            Unit::Percent => "%",
            Unit::Pt => "pt",
        };
        write!(f, "{:.2}{}", self.value, suffix)
    }
}

/// Discriminator of a markup element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupKind {
    Text,
    Image,
    Vector,
    Line,
    Table,
}

impl MarkupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkupKind::Text => "text",
            MarkupKind::Image => "image",
            MarkupKind::Vector => "vector",
            MarkupKind::Line => "line",
            MarkupKind::Table => "table",
        }
    }

    /// Parse a `data-kind` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(MarkupKind::Text),
            "image" => Some(MarkupKind::Image),
            "vector" => Some(MarkupKind::Vector),
            "line" => Some(MarkupKind::Line),
            "table" => Some(MarkupKind::Table),
            _ => None,
        }
    }
}

/// Text style as expressed in markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub font_family: String,
    /// Font size in markup pixels
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub monospace: bool,
    pub serif: bool,
    pub superscript: bool,
    pub subscript: bool,
    /// `#rrggbb`
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            font_size: 16.0,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            monospace: false,
            serif: false,
            superscript: false,
            subscript: false,
            color: "#000000".to_string(),
        }
    }
}

/// Shape style as expressed in markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeStyle {
    /// Stroke color, `#rrggbb`
    pub stroke: Option<String>,
    /// Fill color, `#rrggbb`
    pub fill: Option<String>,
    /// Stroke width in markup pixels
    pub stroke_width: f32,
    pub opacity: f32,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke: None,
            fill: None,
            stroke_width: 1.0,
            opacity: 1.0,
        }
    }
}

/// Where the bytes of an image live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Not yet fetched from the document engine
    Unresolved { image_ref: ImageRef },
    /// Inline bytes
    DataUri {
        mime: String,
        #[serde(serialize_with = "serialize_base64")]
        bytes: Vec<u8>,
    },
    /// A file, relative to the markup document
    File { path: PathBuf },
    /// A remote URL; never fetched
    Remote { url: String },
}

impl ImageSource {
    /// `src` attribute value.
    pub fn to_src(&self) -> Option<String> {
        match self {
            ImageSource::DataUri { mime, bytes } => Some(format!(
                "data:{};base64,{}",
                mime,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )),
            ImageSource::File { path } => Some(path.to_string_lossy().replace('\\', "/")),
            ImageSource::Remote { url } => Some(url.clone()),
            ImageSource::Unresolved { .. } => None,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// One table cell in markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupCell {
    pub text: String,
    /// Page-relative anchor in markup pixels
    pub left: Option<f32>,
    pub top: Option<f32>,
    /// Font size in markup pixels when it differs per cell
    pub font_size: Option<f32>,
}

/// Table payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupTable {
    pub rows: Vec<Vec<MarkupCell>>,
    pub has_header: bool,
    pub style: TextStyle,
}

/// Type-specific content of a markup element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkupPayload {
    Text { content: String, style: TextStyle },
    Image { source: ImageSource },
    Vector {
        style: ShapeStyle,
        /// SVG-like path in element-local pixels
        path: Option<String>,
    },
    Line { style: ShapeStyle },
    Table(MarkupTable),
}

/// An absolutely positioned node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupElement {
    pub kind: MarkupKind,
    pub left: Option<Length>,
    pub top: Option<Length>,
    pub width: Option<Length>,
    pub height: Option<Length>,
    pub z_index: i32,
    pub payload: MarkupPayload,
}

impl MarkupElement {
    /// Build a pixel-positioned element.
    pub fn positioned(
        kind: MarkupKind,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        payload: MarkupPayload,
    ) -> Self {
        Self {
            kind,
            left: Some(Length::px(left)),
            top: Some(Length::px(top)),
            width: Some(Length::px(width)),
            height: Some(Length::px(height)),
            z_index: 0,
            payload,
        }
    }

    pub fn with_z_index(mut self, z: i32) -> Self {
        self.z_index = z;
        self
    }

    /// Text content, if this is a text element.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            MarkupPayload::Text { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// A text-free raster layered under everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundLayer {
    pub source: ImageSource,
    /// Raster size in device pixels
    pub raster_width: u32,
    pub raster_height: u32,
}

/// All markup elements of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupPage {
    /// Page number (1-indexed)
    pub number: u32,
    /// Page width in markup pixels
    pub width_px: f32,
    /// Page height in markup pixels
    pub height_px: f32,
    /// Page width in native units
    pub width_native: f32,
    /// Page height in native units
    pub height_native: f32,
    /// Viewer rotation in degrees; geometry stays in unrotated page space
    pub rotation: i32,
    pub elements: Vec<MarkupElement>,
    pub background: Option<BackgroundLayer>,
}

impl MarkupPage {
    /// Count elements of a kind.
    pub fn count(&self, kind: MarkupKind) -> usize {
        self.elements.iter().filter(|e| e.kind == kind).count()
    }
}
