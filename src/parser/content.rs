//! Content stream interpretation.
//!
//! Walks the operators of a page (and the form XObjects it draws) and turns
//! them into [`GeometricPrimitive`]s in top-left native coordinates.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use super::fonts::{get_number, resolve, resolve_dict, FontResource};
use crate::error::{Error, Result};
use crate::model::{
    style_bits, GeometricPrimitive, ImagePlacement, ImageRef, PathItem, Point, Rect, Rgb, TextRun,
    VectorPath,
};

/// Form XObjects nested deeper than this are not drawn.
const MAX_FORM_DEPTH: usize = 8;

/// TJ adjustment (1/1000 em) above which a word space is inserted.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Descender depth as a fraction of the font size.
pub const DESCENT_RATIO: f32 = 0.2;

/// Affine matrix in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self` followed by `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> Point {
        Point::new(
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Length of a unit horizontal vector after transformation.
    pub fn x_scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    /// Length of a unit vertical vector after transformation.
    pub fn y_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    /// Mean scale, used for line widths.
    pub fn mean_scale(&self) -> f32 {
        (self.x_scale() + self.y_scale()) / 2.0
    }

    /// No rotation or skew.
    pub fn is_axis_aligned(&self) -> bool {
        self.b.abs() < 1e-6 && self.c.abs() < 1e-6
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let n: Vec<f32> = operands[..6].iter().filter_map(get_number).collect();
        if n.len() != 6 {
            return None;
        }
        Some(Matrix::new(n[0], n[1], n[2], n[3], n[4], n[5]))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgb,
    stroke: Rgb,
    line_width: f32,
    fill_alpha: f32,
    stroke_alpha: f32,
    // Text state survives BT/ET and is saved with q/Q.
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: Rgb::BLACK,
            stroke: Rgb::BLACK,
            line_width: 1.0,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Interprets content streams of one page.
pub struct ContentInterpreter<'a> {
    doc: &'a LopdfDocument,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: Vec<PathItem>,
    current: Option<Point>,
    subpath_start: Option<Point>,
    fonts: HashMap<ObjectId, FontResource<'a>>,
    primitives: Vec<GeometricPrimitive>,
}

impl<'a> ContentInterpreter<'a> {
    /// Create an interpreter for a page with the given MediaBox.
    ///
    /// The base transform flips PDF's bottom-up y axis so that every
    /// primitive comes out with a top-left origin.
    pub fn new(doc: &'a LopdfDocument, media_box: Rect) -> Self {
        let height = media_box.height();
        let base = Matrix::new(1.0, 0.0, 0.0, -1.0, -media_box.x0, height + media_box.y0);
        Self {
            doc,
            state: GraphicsState::new(base),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            path: Vec::new(),
            current: None,
            subpath_start: None,
            fonts: HashMap::new(),
            primitives: Vec::new(),
        }
    }

    /// Run a content stream with a resource dictionary.
    pub fn run(mut self, content: &[u8], resources: Option<&'a Dictionary>) -> Result<Vec<GeometricPrimitive>> {
        let content = Content::decode(content).map_err(|e| Error::PdfParse(e.to_string()))?;
        self.execute(&content.operations, resources, 0);
        Ok(self.primitives)
    }

    fn execute(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>, depth: usize) {
        for op in operations {
            let ops = op.operands.as_slice();
            match op.operator.as_str() {
                // Graphics state
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(ops) {
                        self.state.ctm = m.then(&self.state.ctm);
                    }
                }
                "w" => {
                    if let Some(w) = ops.first().and_then(get_number) {
                        self.state.line_width = w;
                    }
                }
                "gs" => self.apply_ext_gstate(ops, resources),

                // Color
                "g" => self.state.fill = gray(ops),
                "G" => self.state.stroke = gray(ops),
                "rg" => self.state.fill = rgb(ops),
                "RG" => self.state.stroke = rgb(ops),
                "k" => self.state.fill = cmyk(ops),
                "K" => self.state.stroke = cmyk(ops),
                "sc" | "scn" => {
                    if let Some(color) = color_from_components(ops) {
                        self.state.fill = color;
                    }
                }
                "SC" | "SCN" => {
                    if let Some(color) = color_from_components(ops) {
                        self.state.stroke = color;
                    }
                }
                "cs" => self.state.fill = Rgb::BLACK,
                "CS" => self.state.stroke = Rgb::BLACK,

                // Text state
                "BT" => {
                    self.text_matrix = Matrix::IDENTITY;
                    self.line_matrix = Matrix::IDENTITY;
                }
                "ET" => {}
                "Tf" => {
                    if ops.len() >= 2 {
                        if let Object::Name(name) = &ops[0] {
                            self.state.font = Some(name.clone());
                        }
                        self.state.font_size = get_number(&ops[1]).unwrap_or(12.0);
                    }
                }
                "Tc" => self.state.char_spacing = first_number(ops).unwrap_or(0.0),
                "Tw" => self.state.word_spacing = first_number(ops).unwrap_or(0.0),
                "Tz" => self.state.h_scale = first_number(ops).unwrap_or(100.0) / 100.0,
                "TL" => self.state.leading = first_number(ops).unwrap_or(0.0),
                "Ts" => self.state.rise = first_number(ops).unwrap_or(0.0),
                "Td" => {
                    if ops.len() >= 2 {
                        let tx = get_number(&ops[0]).unwrap_or(0.0);
                        let ty = get_number(&ops[1]).unwrap_or(0.0);
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if ops.len() >= 2 {
                        let tx = get_number(&ops[0]).unwrap_or(0.0);
                        let ty = get_number(&ops[1]).unwrap_or(0.0);
                        self.state.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(ops) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "T*" => self.next_line(),

                // Text showing
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = ops.first() {
                        self.show(&[ShowItem::Bytes(bytes)], resources);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(arr)) = ops.first() {
                        let items: Vec<ShowItem> = arr
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(ShowItem::Bytes(bytes)),
                                other => get_number(other).map(ShowItem::Adjust),
                            })
                            .collect();
                        self.show(&items, resources);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = ops.first() {
                        self.show(&[ShowItem::Bytes(bytes)], resources);
                    }
                }
                "\"" => {
                    if ops.len() >= 3 {
                        self.state.word_spacing = get_number(&ops[0]).unwrap_or(0.0);
                        self.state.char_spacing = get_number(&ops[1]).unwrap_or(0.0);
                    }
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = ops.get(2) {
                        self.show(&[ShowItem::Bytes(bytes)], resources);
                    }
                }

                // Path construction
                "m" => {
                    if let Some((x, y)) = point_operands(ops, 0) {
                        let p = self.state.ctm.apply(x, y);
                        self.current = Some(p);
                        self.subpath_start = Some(p);
                    }
                }
                "l" => {
                    if let (Some((x, y)), Some(from)) = (point_operands(ops, 0), self.current) {
                        let to = self.state.ctm.apply(x, y);
                        self.path.push(PathItem::Line { from, to });
                        self.current = Some(to);
                    }
                }
                "c" => {
                    if let (Some(p1), Some(p2), Some(p3), Some(p0)) = (
                        point_operands(ops, 0),
                        point_operands(ops, 2),
                        point_operands(ops, 4),
                        self.current,
                    ) {
                        let ctm = self.state.ctm;
                        let end = ctm.apply(p3.0, p3.1);
                        self.push_curve([p0, ctm.apply(p1.0, p1.1), ctm.apply(p2.0, p2.1), end]);
                    }
                }
                "v" => {
                    if let (Some(p2), Some(p3), Some(p0)) =
                        (point_operands(ops, 0), point_operands(ops, 2), self.current)
                    {
                        let ctm = self.state.ctm;
                        let end = ctm.apply(p3.0, p3.1);
                        self.push_curve([p0, p0, ctm.apply(p2.0, p2.1), end]);
                    }
                }
                "y" => {
                    if let (Some(p1), Some(p3), Some(p0)) =
                        (point_operands(ops, 0), point_operands(ops, 2), self.current)
                    {
                        let ctm = self.state.ctm;
                        let end = ctm.apply(p3.0, p3.1);
                        self.push_curve([p0, ctm.apply(p1.0, p1.1), end, end]);
                    }
                }
                "re" => {
                    if let (Some((x, y)), Some((w, h))) = (point_operands(ops, 0), point_operands(ops, 2)) {
                        self.push_rect(x, y, w, h);
                    }
                }
                "h" => self.close_subpath(),

                // Path painting
                "S" => self.paint(true, false, false),
                "s" => {
                    self.close_subpath();
                    self.paint(true, false, false);
                }
                "f" | "F" => self.paint(false, true, false),
                "f*" => self.paint(false, true, true),
                "B" => self.paint(true, true, false),
                "B*" => self.paint(true, true, true),
                "b" => {
                    self.close_subpath();
                    self.paint(true, true, false);
                }
                "b*" => {
                    self.close_subpath();
                    self.paint(true, true, true);
                }
                "n" => self.clear_path(),

                // XObjects
                "Do" => {
                    if let Some(Object::Name(name)) = ops.first() {
                        self.draw_xobject(name, resources, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.state.leading != 0.0 {
            self.state.leading
        } else {
            self.state.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    fn font(&mut self, resources: Option<&'a Dictionary>) -> FontResource<'a> {
        let doc = self.doc;
        let Some(name) = self.state.font.clone() else {
            return FontResource::fallback("Helvetica");
        };
        let entry = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|f| resolve_dict(doc, f))
            .and_then(|fonts| fonts.get(&name).ok());

        match entry {
            Some(Object::Reference(id)) => {
                if let Some(font) = self.fonts.get(id) {
                    return font.clone();
                }
                match doc.get_dictionary(*id).ok() {
                    Some(dict) => {
                        let font = FontResource::from_dict(doc, dict);
                        self.fonts.insert(*id, font.clone());
                        font
                    }
                    None => FontResource::fallback(&String::from_utf8_lossy(&name)),
                }
            }
            Some(Object::Dictionary(dict)) => FontResource::from_dict(doc, dict),
            _ => FontResource::fallback(&String::from_utf8_lossy(&name)),
        }
    }

    fn show(&mut self, items: &[ShowItem<'_>], resources: Option<&'a Dictionary>) {
        let font = self.font(resources);
        let size = self.state.font_size;
        let h_scale = self.state.h_scale;
        let rise = self.state.rise;

        let start = self.text_matrix.then(&self.state.ctm);
        let origin = start.apply(0.0, rise);

        let mut text = String::new();
        for item in items {
            match item {
                ShowItem::Bytes(bytes) => {
                    text.push_str(&font.decode(self.doc, bytes));
                    for code in font.codes(bytes) {
                        let w0 = font.glyph_width(code) / 1000.0;
                        let mut tx = w0 * size + self.state.char_spacing;
                        if !font.two_byte && code == 32 {
                            tx += self.state.word_spacing;
                        }
                        self.text_matrix = Matrix::translate(tx * h_scale, 0.0).then(&self.text_matrix);
                    }
                }
                ShowItem::Adjust(n) => {
                    let tx = -n / 1000.0 * size * h_scale;
                    self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
                    if -n > TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
            }
        }

        let end = self.text_matrix.then(&self.state.ctm).apply(0.0, rise);
        let effective_size = size * start.y_scale();
        if text.trim().is_empty() || !effective_size.is_finite() || effective_size <= 0.0 {
            return;
        }

        let x0 = origin.x.min(end.x);
        let x1 = origin.x.max(end.x);
        let baseline = origin.y;
        let bbox = Rect::new(
            x0,
            baseline - effective_size,
            x1,
            baseline + effective_size * DESCENT_RATIO,
        );

        let mut flags = font.style;
        if rise > 0.0 {
            flags |= style_bits::SUPERSCRIPT;
        } else if rise < 0.0 {
            flags |= style_bits::SUBSCRIPT;
        }

        self.primitives.push(GeometricPrimitive::Text(TextRun {
            text,
            bbox,
            font_name: font.base_font.clone(),
            font_size: effective_size,
            color: self.state.fill,
            flags,
            origin,
        }));
    }

    fn push_curve(&mut self, points: [Point; 4]) {
        self.current = Some(points[3]);
        self.path.push(PathItem::Curve { points });
    }

    fn push_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let ctm = self.state.ctm;
        let corners = [
            ctm.apply(x, y),
            ctm.apply(x + w, y),
            ctm.apply(x + w, y + h),
            ctm.apply(x, y + h),
        ];
        if ctm.is_axis_aligned() {
            if let Some(rect) = Rect::bounding(corners) {
                self.path.push(PathItem::Rect { rect });
            }
        } else {
            self.path.push(PathItem::Quad { points: corners });
        }
        self.current = Some(corners[0]);
        self.subpath_start = Some(corners[0]);
    }

    fn close_subpath(&mut self) {
        if let (Some(from), Some(to)) = (self.current, self.subpath_start) {
            if from != to {
                self.path.push(PathItem::Line { from, to });
            }
            self.current = Some(to);
        }
    }

    fn clear_path(&mut self) {
        self.path.clear();
        self.current = None;
        self.subpath_start = None;
    }

    fn paint(&mut self, stroke: bool, fill: bool, even_odd: bool) {
        let items = std::mem::take(&mut self.path);
        self.clear_path();
        let Some(bbox) = VectorPath::items_bbox(&items) else {
            return;
        };
        let opacity = if fill {
            self.state.fill_alpha
        } else {
            self.state.stroke_alpha
        };
        self.primitives.push(GeometricPrimitive::Path(VectorPath {
            bbox,
            items,
            stroke_color: stroke.then_some(self.state.stroke),
            fill_color: fill.then_some(self.state.fill),
            stroke_width: self.state.line_width * self.state.ctm.mean_scale(),
            opacity,
            even_odd,
        }));
    }

    fn apply_ext_gstate(&mut self, ops: &[Object], resources: Option<&'a Dictionary>) {
        let Some(Object::Name(name)) = ops.first() else {
            return;
        };
        let doc = self.doc;
        let Some(gs) = resources
            .and_then(|r| r.get(b"ExtGState").ok())
            .and_then(|e| resolve_dict(doc, e))
            .and_then(|e| e.get(name).ok())
            .and_then(|g| resolve_dict(doc, g))
        else {
            return;
        };
        if let Some(ca) = gs.get(b"CA").ok().and_then(get_number) {
            self.state.stroke_alpha = ca.clamp(0.0, 1.0);
        }
        if let Some(ca) = gs.get(b"ca").ok().and_then(get_number) {
            self.state.fill_alpha = ca.clamp(0.0, 1.0);
        }
        if let Some(lw) = gs.get(b"LW").ok().and_then(get_number) {
            self.state.line_width = lw;
        }
    }

    fn draw_xobject(&mut self, name: &[u8], resources: Option<&'a Dictionary>, depth: usize) {
        let doc = self.doc;
        let Some(entry) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve_dict(doc, x))
            .and_then(|x| x.get(name).ok())
        else {
            log::debug!("XObject {} not found", String::from_utf8_lossy(name));
            return;
        };
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Some(Object::Stream(stream)) = resolve(doc, entry) else {
            return;
        };
        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or_default();

        match subtype {
            b"Image" => {
                let Some(id) = id else {
                    return;
                };
                let ctm = self.state.ctm;
                let corners = [
                    ctm.apply(0.0, 0.0),
                    ctm.apply(1.0, 0.0),
                    ctm.apply(1.0, 1.0),
                    ctm.apply(0.0, 1.0),
                ];
                let Some(bbox) = Rect::bounding(corners) else {
                    return;
                };
                let dim = |key: &[u8]| {
                    stream
                        .dict
                        .get(key)
                        .ok()
                        .and_then(|o| o.as_i64().ok())
                        .unwrap_or(0)
                        .max(0) as u32
                };
                let bits = stream
                    .dict
                    .get(b"BitsPerComponent")
                    .ok()
                    .and_then(|o| o.as_i64().ok())
                    .unwrap_or(8) as u8;
                self.primitives.push(GeometricPrimitive::Image(ImagePlacement {
                    image_ref: ImageRef(format!("{} {}", id.0, id.1)),
                    bbox,
                    pixel_width: dim(b"Width"),
                    pixel_height: dim(b"Height"),
                    color_depth: bits,
                }));
            }
            b"Form" => {
                if depth >= MAX_FORM_DEPTH {
                    log::debug!("form XObject nesting limit reached");
                    return;
                }
                let content = match stream.decompressed_content() {
                    Ok(data) => data,
                    Err(_) => stream.content.clone(),
                };
                let operations = match Content::decode(&content) {
                    Ok(c) => c.operations,
                    Err(e) => {
                        log::warn!("skipping undecodable form XObject: {}", e);
                        return;
                    }
                };
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve_dict(doc, r))
                    .or(resources);

                let saved = self.state.clone();
                let saved_stack = self.stack.len();
                if let Some(m) = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|m| m.as_array().ok())
                    .and_then(|arr| Matrix::from_operands(arr))
                {
                    self.state.ctm = m.then(&self.state.ctm);
                }
                let saved_text = (self.text_matrix, self.line_matrix);
                self.execute(&operations, form_resources, depth + 1);
                self.stack.truncate(saved_stack);
                self.state = saved;
                (self.text_matrix, self.line_matrix) = saved_text;
            }
            _ => {}
        }
    }
}

enum ShowItem<'b> {
    Bytes(&'b [u8]),
    Adjust(f32),
}

fn first_number(ops: &[Object]) -> Option<f32> {
    ops.first().and_then(get_number)
}

fn point_operands(ops: &[Object], at: usize) -> Option<(f32, f32)> {
    let x = ops.get(at).and_then(get_number)?;
    let y = ops.get(at + 1).and_then(get_number)?;
    Some((x, y))
}

fn gray(ops: &[Object]) -> Rgb {
    Rgb::gray(first_number(ops).unwrap_or(0.0))
}

fn rgb(ops: &[Object]) -> Rgb {
    let n: Vec<f32> = ops.iter().filter_map(get_number).collect();
    if n.len() >= 3 {
        Rgb::new(n[0], n[1], n[2])
    } else {
        Rgb::BLACK
    }
}

fn cmyk(ops: &[Object]) -> Rgb {
    let n: Vec<f32> = ops.iter().filter_map(get_number).collect();
    if n.len() >= 4 {
        Rgb::from_cmyk(n[0], n[1], n[2], n[3])
    } else {
        Rgb::BLACK
    }
}

/// Color from `sc`/`scn` operands, guessing the space from the component count.
fn color_from_components(ops: &[Object]) -> Option<Rgb> {
    let n: Vec<f32> = ops.iter().filter_map(get_number).collect();
    match n.len() {
        1 => Some(Rgb::gray(n[0])),
        3 => Some(Rgb::new(n[0], n[1], n[2])),
        4 => Some(Rgb::from_cmyk(n[0], n[1], n[2], n[3])),
        _ => None,
    }
}
