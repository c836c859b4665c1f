//! Data model shared by extraction and reconstruction.
//!
//! Primitives and classified elements live in native units (points, top-left
//! origin). Markup types live in markup pixels. The two never mix inside one
//! structure.

mod document;
mod element;
mod geometry;
mod markup;
mod primitive;
mod table;

pub use document::{Metadata, PageInfo};
pub use element::{ClassifiedElement, ElementKind, StyleFlags, StyleRecord};
pub use geometry::{Point, Rect, Rgb};
pub use markup::{
    BackgroundLayer, ImageSource, Length, MarkupCell, MarkupElement, MarkupKind, MarkupPage,
    MarkupPayload, MarkupTable, ShapeStyle, TextStyle, Unit,
};
pub use primitive::{
    style_bits, GeometricPrimitive, ImagePlacement, ImageRef, PathItem, TextRun, VectorPath,
};
pub use table::{TableCell, TableRegion};
