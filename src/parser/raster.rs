//! Graphics-only page rasterization with tiny-skia.
//!
//! Text is never drawn. Redaction rectangles are painted white after
//! everything else, so the output is the non-text visual baseline of a page.

use image::RgbaImage;
use tiny_skia::{
    Color, FillRule, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use crate::error::{Error, Result};
use crate::model::{GeometricPrimitive, ImagePlacement, ImageRef, PathItem, Rect, VectorPath};

/// Largest raster side accepted, in device pixels.
const MAX_RASTER_SIDE: u32 = 16_384;

/// A PNG-encoded page raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Rasterize vector paths and images of a page, then blank `redactions`.
///
/// `page_width`/`page_height` and every box are native units; `scale` is
/// device pixels per native unit. Images are fetched through `load_image`;
/// an image that fails to load is left out and logged.
pub fn rasterize<F>(
    page_width: f32,
    page_height: f32,
    primitives: &[GeometricPrimitive],
    redactions: &[Rect],
    scale: f32,
    mut load_image: F,
) -> Result<Raster>
where
    F: FnMut(&ImageRef) -> Result<RgbaImage>,
{
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Render(format!("invalid raster scale {}", scale)));
    }
    let width = (page_width * scale).ceil().max(1.0) as u32;
    let height = (page_height * scale).ceil().max(1.0) as u32;
    if width > MAX_RASTER_SIDE || height > MAX_RASTER_SIDE {
        return Err(Error::Render(format!(
            "raster of {}x{} exceeds the size limit",
            width, height
        )));
    }

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| Error::Render("failed to create pixmap".to_string()))?;
    pixmap.fill(Color::WHITE);

    let transform = Transform::from_scale(scale, scale);

    for prim in primitives {
        match prim {
            GeometricPrimitive::Path(path) => draw_path(&mut pixmap, path, transform),
            GeometricPrimitive::Image(img) => match load_image(&img.image_ref) {
                Ok(rgba) => draw_image(&mut pixmap, img, &rgba, scale),
                Err(e) => log::debug!("image {} not rasterized: {}", img.image_ref, e),
            },
            GeometricPrimitive::Text(_) => {}
        }
    }

    let mut white = Paint::default();
    white.set_color(Color::WHITE);
    white.anti_alias = false;
    for r in redactions {
        if let Some(rect) = tiny_skia::Rect::from_ltrb(r.x0, r.y0, r.x1, r.y1) {
            pixmap.fill_rect(rect, &white, transform, None);
        }
    }

    let png = pixmap
        .encode_png()
        .map_err(|e| Error::Render(format!("PNG encoding failed: {}", e)))?;

    Ok(Raster { width, height, png })
}

fn build_path(items: &[PathItem]) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    let mut last = None;
    for item in items {
        match item {
            PathItem::Line { from, to } => {
                if last != Some(*from) {
                    pb.move_to(from.x, from.y);
                }
                pb.line_to(to.x, to.y);
                last = Some(*to);
            }
            PathItem::Rect { rect } => {
                if let Some(r) = tiny_skia::Rect::from_ltrb(rect.x0, rect.y0, rect.x1, rect.y1) {
                    pb.push_rect(r);
                }
                last = None;
            }
            PathItem::Quad { points } => {
                pb.move_to(points[0].x, points[0].y);
                for p in &points[1..] {
                    pb.line_to(p.x, p.y);
                }
                pb.close();
                last = None;
            }
            PathItem::Curve { points } => {
                let [p0, c1, c2, end] = points;
                if last != Some(*p0) {
                    pb.move_to(p0.x, p0.y);
                }
                pb.cubic_to(c1.x, c1.y, c2.x, c2.y, end.x, end.y);
                last = Some(*end);
            }
        }
    }
    pb.finish()
}

fn draw_path(pixmap: &mut Pixmap, path: &VectorPath, transform: Transform) {
    let Some(sk_path) = build_path(&path.items) else {
        return;
    };
    let alpha = (path.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;

    if let Some(fill) = path.fill_color {
        let [r, g, b] = fill.to_rgb8();
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, alpha);
        paint.anti_alias = true;
        let rule = if path.even_odd {
            FillRule::EvenOdd
        } else {
            FillRule::Winding
        };
        pixmap.fill_path(&sk_path, &paint, rule, transform, None);
    }

    if let Some(stroke_color) = path.stroke_color {
        let [r, g, b] = stroke_color.to_rgb8();
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, alpha);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: path.stroke_width.max(0.0),
            ..Stroke::default()
        };
        pixmap.stroke_path(&sk_path, &paint, &stroke, transform, None);
    }
}

fn draw_image(pixmap: &mut Pixmap, placement: &ImagePlacement, rgba: &RgbaImage, scale: f32) {
    let (iw, ih) = rgba.dimensions();
    let Some(size) = IntSize::from_wh(iw, ih) else {
        return;
    };

    // tiny-skia stores premultiplied RGBA.
    let mut data = rgba.as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a < 255 {
            px[0] = (px[0] as u16 * a / 255) as u8;
            px[1] = (px[1] as u16 * a / 255) as u8;
            px[2] = (px[2] as u16 * a / 255) as u8;
        }
    }
    let Some(image) = Pixmap::from_vec(data, size) else {
        return;
    };

    let bbox = placement.bbox;
    let transform = Transform::from_row(
        bbox.width() / iw as f32,
        0.0,
        0.0,
        bbox.height() / ih as f32,
        bbox.x0,
        bbox.y0,
    )
    .post_scale(scale, scale);

    pixmap.draw_pixmap(0, 0, image.as_ref(), &PixmapPaint::default(), transform, None);
}
