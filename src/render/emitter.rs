//! Classified elements to absolutely positioned markup elements.
//!
//! Emission order within a page is fixed: images, vector shapes, dividers,
//! text spans, tables. Stacking follows that order, so text always sits
//! above the graphics it was drawn over. Index 0 is left for the background.

use crate::error::{Diagnostics, Error, Result};
use crate::model::{
    ClassifiedElement, ElementKind, MarkupCell, MarkupElement, MarkupKind, MarkupPage,
    MarkupPayload, MarkupTable, PageInfo, PathItem, Point, Rect, ShapeStyle, StyleRecord,
    TableRegion, TextStyle,
};
use crate::units::CoordinateMapper;

/// Rank of an element kind in the emission order.
fn emission_rank(kind: &ElementKind) -> u8 {
    match kind {
        ElementKind::RasterImage { .. } => 0,
        ElementKind::VectorShape { .. } => 1,
        ElementKind::Divider { .. } => 2,
        ElementKind::TextSpan { .. } => 3,
        ElementKind::TableRegion(_) => 4,
    }
}

/// Serializes classified elements into markup elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupEmitter {
    mapper: CoordinateMapper,
}

impl MarkupEmitter {
    pub fn new(mapper: CoordinateMapper) -> Self {
        Self { mapper }
    }

    /// Emit one page. Elements that cannot be mapped are reported and skipped.
    pub fn emit(&self, page: &PageInfo, elements: &[ClassifiedElement]) -> Result<(MarkupPage, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();

        let mut order: Vec<usize> = (0..elements.len()).collect();
        order.sort_by_key(|&i| emission_rank(&elements[i].kind));

        let mut emitted = Vec::with_capacity(elements.len());
        for i in order {
            match self.emit_element(&elements[i]) {
                Ok(element) => {
                    let z = emitted.len() as i32 + 1;
                    emitted.push(element.with_z_index(z));
                }
                Err(e) => diagnostics.element(page.number, i, e),
            }
        }

        let markup = MarkupPage {
            number: page.number,
            width_px: self.mapper.to_markup_units(page.width)?,
            height_px: self.mapper.to_markup_units(page.height)?,
            width_native: page.width,
            height_native: page.height,
            rotation: page.rotation,
            elements: emitted,
            background: None,
        };
        Ok((markup, diagnostics))
    }

    /// Emit a single element, positioned by its pixel box.
    pub fn emit_element(&self, element: &ClassifiedElement) -> Result<MarkupElement> {
        let b = element.pixel_bbox;
        if !b.is_finite() || b.width() < 0.0 || b.height() < 0.0 {
            return Err(Error::UnitConversion(format!("invalid pixel box {:?}", b)));
        }

        let (kind, payload) = match &element.kind {
            ElementKind::TextSpan { text, .. } => (
                MarkupKind::Text,
                MarkupPayload::Text {
                    content: text.clone(),
                    style: self.text_style(&element.style)?,
                },
            ),
            ElementKind::RasterImage { image_ref, .. } => (
                MarkupKind::Image,
                MarkupPayload::Image {
                    source: crate::model::ImageSource::Unresolved {
                        image_ref: image_ref.clone(),
                    },
                },
            ),
            ElementKind::VectorShape { items, stroke, .. } => {
                let mut style = self.shape_style(&element.style)?;
                style.stroke = stroke.map(|c| c.to_hex());
                (
                    MarkupKind::Vector,
                    MarkupPayload::Vector {
                        style,
                        path: self.svg_path(items, &element.bbox),
                    },
                )
            }
            ElementKind::Divider { items } => {
                let mut style = self.shape_style(&element.style)?;
                if matches!(items.as_slice(), [PathItem::Line { .. }]) {
                    style.stroke = Some(element.style.color_hex());
                    style.fill = None;
                } else {
                    style.stroke = None;
                }
                (MarkupKind::Line, MarkupPayload::Line { style })
            }
            ElementKind::TableRegion(table) => (
                MarkupKind::Table,
                MarkupPayload::Table(self.table(table, &element.style)?),
            ),
        };

        Ok(MarkupElement::positioned(
            kind,
            b.x0,
            b.y0,
            b.width(),
            b.height(),
            payload,
        ))
    }

    fn text_style(&self, style: &StyleRecord) -> Result<TextStyle> {
        let flags = style.flags;
        Ok(TextStyle {
            font_family: style.font_family.clone(),
            font_size: self.mapper.to_markup_units(style.font_size)?,
            bold: style.is_bold(),
            italic: flags.italic,
            underline: flags.underline,
            strikethrough: flags.strikethrough,
            monospace: flags.monospace,
            serif: flags.serif,
            superscript: flags.superscript,
            subscript: flags.subscript,
            color: style.color_hex(),
        })
    }

    fn shape_style(&self, style: &StyleRecord) -> Result<ShapeStyle> {
        Ok(ShapeStyle {
            stroke: Some(style.color_hex()),
            fill: style.fill.map(|c| c.to_hex()),
            stroke_width: self.mapper.to_markup_units(style.stroke_width.max(0.0))?,
            opacity: style.opacity.clamp(0.0, 1.0),
        })
    }

    fn table(&self, table: &TableRegion, style: &StyleRecord) -> Result<MarkupTable> {
        let mut rows = Vec::with_capacity(table.row_count());
        for row in &table.cells {
            let mut cells = Vec::with_capacity(row.len());
            for cell in row {
                let (left, top) = match cell.anchor {
                    Some(p) => (
                        Some(self.mapper.coord_to_markup(p.x)?),
                        Some(self.mapper.coord_to_markup(p.y)?),
                    ),
                    None => (None, None),
                };
                let font_size = match cell.font_size {
                    Some(size) => Some(self.mapper.to_markup_units(size)?),
                    None => None,
                };
                cells.push(MarkupCell {
                    text: cell.text.clone(),
                    left,
                    top,
                    font_size,
                });
            }
            rows.push(cells);
        }
        Ok(MarkupTable {
            rows,
            has_header: table.has_header,
            style: self.text_style(style)?,
        })
    }

    /// SVG-like path data in element-local pixels.
    fn svg_path(&self, items: &[PathItem], bbox: &Rect) -> Option<String> {
        let ratio = self.mapper.ratio();
        let local = |p: &Point| ((p.x - bbox.x0) * ratio, (p.y - bbox.y0) * ratio);
        let mut out: Vec<String> = Vec::new();
        let mut last: Option<Point> = None;

        for item in items {
            match item {
                PathItem::Line { from, to } => {
                    if last != Some(*from) {
                        let (x, y) = local(from);
                        out.push(format!("M {:.2} {:.2}", x, y));
                    }
                    let (x, y) = local(to);
                    out.push(format!("L {:.2} {:.2}", x, y));
                    last = Some(*to);
                }
                PathItem::Rect { rect } => {
                    let corners = [
                        Point::new(rect.x0, rect.y0),
                        Point::new(rect.x1, rect.y0),
                        Point::new(rect.x1, rect.y1),
                        Point::new(rect.x0, rect.y1),
                    ];
                    push_polygon(&mut out, &corners, local);
                    last = None;
                }
                PathItem::Quad { points } => {
                    push_polygon(&mut out, points, local);
                    last = None;
                }
                PathItem::Curve { points } => {
                    let [p0, c1, c2, end] = points;
                    if last != Some(*p0) {
                        let (x, y) = local(p0);
                        out.push(format!("M {:.2} {:.2}", x, y));
                    }
                    let (x1, y1) = local(c1);
                    let (x2, y2) = local(c2);
                    let (x3, y3) = local(end);
                    out.push(format!(
                        "C {:.2} {:.2} {:.2} {:.2} {:.2} {:.2}",
                        x1, y1, x2, y2, x3, y3
                    ));
                    last = Some(*end);
                }
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(out.join(" "))
        }
    }
}

fn push_polygon(out: &mut Vec<String>, points: &[Point], local: impl Fn(&Point) -> (f32, f32)) {
    for (i, p) in points.iter().enumerate() {
        let (x, y) = local(p);
        let op = if i == 0 { "M" } else { "L" };
        out.push(format!("{} {:.2} {:.2}", op, x, y));
    }
    out.push("Z".to_string());
}
