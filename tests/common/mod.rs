//! PDF fixtures built with the crate's own writer.

#![allow(dead_code)]

use std::io::Cursor;

use pagemark::model::{PathItem, Point, Rect, Rgb};
use pagemark::parser::ImageData;
use pagemark::rebuild::{ShapePlacementStyle, TextPlacementStyle};
use pagemark::{PdfWriter, PlacementCommand};

pub fn text(x: f32, baseline: f32, content: &str, size: f32) -> PlacementCommand {
    PlacementCommand::PlaceText {
        position: Point::new(x, baseline),
        content: content.to_string(),
        style: TextPlacementStyle {
            font_family: "Helvetica".to_string(),
            font_size: size,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            monospace: false,
            serif: false,
            color: Rgb::BLACK,
        },
    }
}

pub fn filled_rect(x: f32, y: f32, width: f32, height: f32, color: Rgb) -> PlacementCommand {
    PlacementCommand::PlaceVector {
        position: Point::new(x, y),
        width,
        height,
        style: ShapePlacementStyle {
            stroke: None,
            fill: Some(color),
            stroke_width: 0.0,
            opacity: 1.0,
        },
        path: vec![PathItem::Rect {
            rect: Rect::from_xywh(x, y, width, height),
        }],
    }
}

pub fn png(width: u32, height: u32) -> ImageData {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    ImageData {
        bytes,
        mime: "image/png".to_string(),
    }
}

pub fn image(x: f32, y: f32, width: f32, height: f32) -> PlacementCommand {
    PlacementCommand::PlaceImage {
        position: Point::new(x, y),
        width,
        height,
        image: png(4, 4),
    }
}

/// A PDF with one page per entry, each `(width, height, commands)`.
pub fn build_pdf(pages: &[(f32, f32, Vec<PlacementCommand>)]) -> Vec<u8> {
    let mut writer = PdfWriter::new();
    for (width, height, commands) in pages {
        writer.add_page(*width, *height, commands).unwrap();
    }
    writer.finish().unwrap()
}

/// A letter-sized page with a heading, a paragraph, a divider and a box.
pub fn report_page() -> Vec<PlacementCommand> {
    vec![
        text(72.0, 100.0, "Quarterly report", 18.0),
        text(72.0, 160.0, "Revenue grew in every region.", 11.0),
        filled_rect(72.0, 200.0, 468.0, 0.5, Rgb::BLACK),
        filled_rect(300.0, 300.0, 120.0, 80.0, Rgb::new(0.2, 0.4, 0.8)),
    ]
}
