//! Markup back to PDF.
//!
//! [`ElementReconstructor`] turns markup elements into placement commands
//! in native units and [`PdfWriter`] draws them.

mod reconstructor;
mod writer;

pub use reconstructor::{
    load_image, ElementReconstructor, PagePlan, PlacementCommand, ShapePlacementStyle,
    TextPlacementStyle,
};
pub use writer::PdfWriter;
