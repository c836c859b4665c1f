//! Font resources used while interpreting content streams.

use lopdf::{Dictionary, Document as LopdfDocument, Object};

use crate::model::style_bits;

/// FontDescriptor flag bits.
const FD_FIXED_PITCH: i64 = 1 << 0;
const FD_SERIF: i64 = 1 << 1;
const FD_ITALIC: i64 = 1 << 6;
const FD_FORCE_BOLD: i64 = 1 << 18;

/// A font as seen by the content interpreter.
#[derive(Debug, Clone)]
pub struct FontResource<'a> {
    /// Font dictionary, used to look up the encoding on demand
    dict: Option<&'a Dictionary>,
    /// Base font name (e.g. "ABCDEF+Helvetica-Bold")
    pub base_font: String,
    first_char: u32,
    /// Glyph widths in 1/1000 em, indexed from `first_char`
    widths: Vec<f32>,
    /// CID widths as (first, last, width)
    cid_widths: Vec<(u32, u32, f32)>,
    default_width: f32,
    /// Codes are two bytes wide (Type0 fonts)
    pub two_byte: bool,
    /// Style bits derived from the descriptor and the name
    pub style: u32,
}

impl<'a> FontResource<'a> {
    /// Fallback used when the font dictionary cannot be resolved.
    pub fn fallback(name: &str) -> Self {
        Self {
            dict: None,
            base_font: name.to_string(),
            first_char: 0,
            widths: Vec::new(),
            cid_widths: Vec::new(),
            default_width: default_glyph_width(name),
            two_byte: false,
            style: style_from_name(name),
        }
    }

    /// Read a font dictionary.
    pub fn from_dict(doc: &'a LopdfDocument, dict: &'a Dictionary) -> Self {
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let two_byte = dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| n == b"Type0")
            .unwrap_or(false);

        let mut font = Self::fallback(&base_font);
        font.dict = Some(dict);
        font.two_byte = two_byte;

        if two_byte {
            if let Some(descendant) = first_descendant(doc, dict) {
                font.default_width = descendant
                    .get(b"DW")
                    .ok()
                    .and_then(get_number)
                    .unwrap_or(1000.0);
                if let Some(w) = descendant.get(b"W").ok().and_then(|o| resolve_array(doc, o)) {
                    font.cid_widths = parse_cid_widths(doc, w);
                }
                font.style |= descriptor_style(doc, descendant);
            }
        } else {
            font.first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(0)
                .max(0) as u32;
            if let Some(widths) = dict.get(b"Widths").ok().and_then(|o| resolve_array(doc, o)) {
                font.widths = widths
                    .iter()
                    .map(|w| resolve(doc, w).and_then(get_number).unwrap_or(0.0))
                    .collect();
            }
            font.style |= descriptor_style(doc, dict);
        }

        font
    }

    /// Decode shown bytes into text using the font encoding.
    pub fn decode(&self, doc: &LopdfDocument, bytes: &[u8]) -> String {
        if let Some(dict) = self.dict {
            if let Ok(enc) = dict.get_font_encoding(doc) {
                if let Ok(text) = LopdfDocument::decode_text(&enc, bytes) {
                    return text;
                }
            }
        }
        decode_text_simple(bytes)
    }

    /// Split shown bytes into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| {
                    if c.len() == 2 {
                        u16::from_be_bytes([c[0], c[1]]) as u32
                    } else {
                        c[0] as u32
                    }
                })
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        }
    }

    /// Advance width of a code in 1/1000 em.
    pub fn glyph_width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .iter()
                .find(|(first, last, _)| (*first..=*last).contains(&code))
                .map(|(_, _, w)| *w)
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }
}

/// Default glyph width in 1/1000 em for fonts without a width table.
fn default_glyph_width(name: &str) -> f32 {
    let lower = name.to_lowercase();
    if lower.contains("courier") || lower.contains("mono") {
        600.0
    } else {
        500.0
    }
}

/// Style bits implied by a font name.
pub fn style_from_name(name: &str) -> u32 {
    let lower = name.to_lowercase();
    let mut bits = 0;
    if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
        bits |= style_bits::BOLD;
    }
    if lower.contains("italic") || lower.contains("oblique") {
        bits |= style_bits::ITALIC;
    }
    if lower.contains("courier") || lower.contains("mono") || lower.contains("consol") {
        bits |= style_bits::MONOSPACE;
    }
    if !lower.contains("sans")
        && (lower.contains("times") || lower.contains("serif") || lower.contains("georgia"))
    {
        bits |= style_bits::SERIF;
    }
    bits
}

fn descriptor_style(doc: &LopdfDocument, font: &Dictionary) -> u32 {
    let flags = font
        .get(b"FontDescriptor")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"Flags").ok())
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0);

    let mut bits = 0;
    if flags & FD_FIXED_PITCH != 0 {
        bits |= style_bits::MONOSPACE;
    }
    if flags & FD_SERIF != 0 {
        bits |= style_bits::SERIF;
    }
    if flags & FD_ITALIC != 0 {
        bits |= style_bits::ITALIC;
    }
    if flags & FD_FORCE_BOLD != 0 {
        bits |= style_bits::BOLD;
    }
    bits
}

fn first_descendant<'a>(doc: &'a LopdfDocument, font: &'a Dictionary) -> Option<&'a Dictionary> {
    let descendants = font
        .get(b"DescendantFonts")
        .ok()
        .and_then(|o| resolve_array(doc, o))?;
    descendants
        .first()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
}

/// Parse a CIDFont `W` array: `c [w1 w2 ...]` and `c_first c_last w` forms.
fn parse_cid_widths(doc: &LopdfDocument, w: &[Object]) -> Vec<(u32, u32, f32)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = get_number(&w[i]).map(|v| v as u32) else {
            break;
        };
        match w.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (k, width) in list.iter().enumerate() {
                    if let Some(width) = get_number(width) {
                        let code = first + k as u32;
                        out.push((code, code, width));
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = get_number(last).map(|v| v as u32).unwrap_or(first);
                let width = w.get(i + 2).and_then(get_number).unwrap_or(1000.0);
                out.push((first, last, width));
                i += 3;
            }
            None => break,
        }
    }
    out
}

/// Follow a reference, if the object is one.
pub fn resolve<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resolve an object to a dictionary (direct, referenced, or a stream's dictionary).
pub fn resolve_dict<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

fn resolve_array<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> Option<&'a [Object]> {
    match resolve(doc, obj)? {
        Object::Array(a) => Some(a.as_slice()),
        _ => None,
    }
}

/// Helper to extract a number from a PDF object.
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}
