//! Inline style and attribute value parsing.
//!
//! Only what absolutely positioned pages use is understood: lengths in
//! `px`, `%` and `pt`, hex and `rgb()` colors, border shorthands, and
//! SVG-like path data with `M L H V C Z` commands.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::model::{Length, PathItem, Point, Rgb, Unit};

/// Parsed `style` attribute, property names lowercased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineStyle {
    properties: HashMap<String, String>,
}

impl InlineStyle {
    /// Parse `prop: value; prop: value`.
    pub fn parse(style: &str) -> Self {
        let properties = style
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect();
        Self { properties }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Compiled value patterns.
pub struct StyleParser {
    length_regex: Regex,
    rgb_regex: Regex,
    path_token_regex: Regex,
}

impl StyleParser {
    pub fn new() -> Result<Self> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| Error::Other(format!("regex: {}", e)));
        Ok(Self {
            length_regex: compile(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+))\s*(px|%|pt)?\s*$")?,
            rgb_regex: compile(
                r"^\s*rgba?\(\s*([\d.]+)\s*,\s*([\d.]+)\s*,\s*([\d.]+)\s*(?:,\s*[\d.]+\s*)?\)\s*$",
            )?,
            path_token_regex: compile(r"[MmLlHhVvCcZz]|[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?")?,
        })
    }

    /// A length in `px`, `%` or `pt`. A bare number is pixels.
    pub fn length(&self, value: &str) -> Option<Length> {
        let caps = self.length_regex.captures(value)?;
        let number: f32 = caps.get(1)?.as_str().parse().ok()?;
        if !number.is_finite() {
            return None;
        }
        let unit = match caps.get(2).map(|m| m.as_str()) {
            Some("%") => Unit::Percent,
            Some("pt") => Unit::Pt,
            _ => Unit::Px,
        };
        Some(Length { value: number, unit })
    }

    /// A font size in `px` or `pt`.
    pub fn font_size(&self, value: &str) -> Option<Length> {
        self.length(value).filter(|l| l.unit != Unit::Percent)
    }

    /// `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a basic color keyword.
    pub fn color(&self, value: &str) -> Option<Rgb> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(caps) = self.rgb_regex.captures(value) {
            let channel = |i: usize| -> Option<u8> {
                let v: f32 = caps.get(i)?.as_str().parse().ok()?;
                Some(v.clamp(0.0, 255.0).round() as u8)
            };
            return Some(Rgb::from_rgb8(channel(1)?, channel(2)?, channel(3)?));
        }
        match value.to_ascii_lowercase().as_str() {
            "black" => Some(Rgb::BLACK),
            "white" => Some(Rgb::WHITE),
            "red" => Some(Rgb::from_rgb8(255, 0, 0)),
            "green" => Some(Rgb::from_rgb8(0, 128, 0)),
            "blue" => Some(Rgb::from_rgb8(0, 0, 255)),
            "gray" | "grey" => Some(Rgb::from_rgb8(128, 128, 128)),
            _ => None,
        }
    }

    /// `width style color` border shorthand. Returns pixel width and color.
    pub fn border(&self, value: &str) -> (Option<f32>, Option<Rgb>) {
        let mut width = None;
        let mut color = None;
        let mut rest = value.trim();
        if rest.eq_ignore_ascii_case("none") {
            return (None, None);
        }
        // rgb() contains spaces, so peel it off before splitting.
        if let Some(start) = rest.find("rgb") {
            color = self.color(&rest[start..]);
            rest = &rest[..start];
        }
        for token in rest.split_whitespace() {
            if let Some(length) = self.length(token) {
                if length.unit == Unit::Px {
                    width = Some(length.value);
                }
            } else if color.is_none() {
                color = self.color(token);
            }
        }
        (width, color)
    }

    /// Parse path data into items in the same local pixel space.
    pub fn path(&self, data: &str) -> Result<Vec<PathItem>> {
        let tokens: Vec<&str> = self
            .path_token_regex
            .find_iter(data)
            .map(|m| m.as_str())
            .collect();

        let mut items = Vec::new();
        let mut pos = 0;
        let mut current = Point::default();
        let mut start = Point::default();
        let mut command = None;

        let number = |pos: &mut usize| -> Result<f32> {
            let token = tokens
                .get(*pos)
                .ok_or_else(|| Error::Markup("truncated path data".to_string()))?;
            *pos += 1;
            token
                .parse::<f32>()
                .map_err(|_| Error::Markup(format!("expected a number in path, found '{}'", token)))
        };

        while pos < tokens.len() {
            let token = tokens[pos];
            if token.chars().all(|c| c.is_ascii_alphabetic()) {
                command = token.chars().next();
                pos += 1;
            }
            let Some(cmd) = command else {
                return Err(Error::Markup("path data must start with a command".to_string()));
            };
            let relative = cmd.is_ascii_lowercase();
            let base = if relative { current } else { Point::default() };
            let point = |x: f32, y: f32| Point::new(base.x + x, base.y + y);

            match cmd.to_ascii_uppercase() {
                'M' => {
                    let (x, y) = (number(&mut pos)?, number(&mut pos)?);
                    current = point(x, y);
                    start = current;
                    // Extra pairs after a move are implicit line-tos.
                    command = Some(if relative { 'l' } else { 'L' });
                }
                'L' => {
                    let (x, y) = (number(&mut pos)?, number(&mut pos)?);
                    let to = point(x, y);
                    items.push(PathItem::Line { from: current, to });
                    current = to;
                }
                'H' => {
                    let x = number(&mut pos)?;
                    let to = Point::new(if relative { current.x + x } else { x }, current.y);
                    items.push(PathItem::Line { from: current, to });
                    current = to;
                }
                'V' => {
                    let y = number(&mut pos)?;
                    let to = Point::new(current.x, if relative { current.y + y } else { y });
                    items.push(PathItem::Line { from: current, to });
                    current = to;
                }
                'C' => {
                    let c1 = point(number(&mut pos)?, number(&mut pos)?);
                    let c2 = point(number(&mut pos)?, number(&mut pos)?);
                    let end = point(number(&mut pos)?, number(&mut pos)?);
                    items.push(PathItem::Curve {
                        points: [current, c1, c2, end],
                    });
                    current = end;
                }
                'Z' => {
                    if current != start {
                        items.push(PathItem::Line {
                            from: current,
                            to: start,
                        });
                    }
                    current = start;
                    command = None;
                }
                other => {
                    return Err(Error::Markup(format!("unsupported path command '{}'", other)));
                }
            }
        }

        Ok(items)
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut channels = hex.chars().map(|c| byte(&format!("{}{}", c, c)));
            Some(Rgb::from_rgb8(channels.next()??, channels.next()??, channels.next()??))
        }
        6 => Some(Rgb::from_rgb8(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
        _ => None,
    }
}

/// CSS `font-weight` as bold or not.
pub fn is_bold_weight(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "bold" | "bolder" => true,
        other => other.parse::<u16>().map(|w| w >= 600).unwrap_or(false),
    }
}
