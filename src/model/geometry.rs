//! Geometry and color primitives shared by every stage.

use serde::{Deserialize, Serialize};

/// A point in a page coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned rectangle with a top-left origin (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle from its corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a rectangle from origin and size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Smallest rectangle holding every point, or `None` for no points.
    pub fn bounding<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in iter {
            rect.x0 = rect.x0.min(p.x);
            rect.y0 = rect.y0.min(p.y);
            rect.x1 = rect.x1.max(p.x);
            rect.y1 = rect.y1.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Inverted, non-finite, or collapsed to a single point.
    ///
    /// A rectangle with one zero side (a hairline) is not degenerate.
    pub fn is_degenerate(&self) -> bool {
        !self.is_finite()
            || self.width() < 0.0
            || self.height() < 0.0
            || (self.width() == 0.0 && self.height() == 0.0)
    }

    /// Union of two rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    /// Intersection, or `None` when the rectangles do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        if r.width() > 0.0 && r.height() > 0.0 {
            Some(r)
        } else {
            None
        }
    }

    /// Grow the rectangle by `pad` on every side.
    pub fn expand(&self, pad: f32) -> Rect {
        Rect::new(self.x0 - pad, self.y0 - pad, self.x1 + pad, self.y1 + pad)
    }

    /// Clamp the rectangle to `bounds`.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        Rect::new(
            self.x0.max(bounds.x0),
            self.y0.max(bounds.y0),
            self.x1.min(bounds.x1),
            self.y1.min(bounds.y1),
        )
    }
}

/// An RGB color with each channel in `[0, 1]`.
///
/// Channels stay floating point through classification; conversion to
/// 8-bit hex happens once, at emission.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    /// Create a color, clamping each channel into `[0, 1]`.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }

    /// Gray level.
    pub fn gray(level: f32) -> Self {
        Self::new(level, level, level)
    }

    /// Naive CMYK to RGB conversion.
    pub fn from_cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self::new(
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        )
    }

    /// From 8-bit channels.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// 8-bit channels, rounded.
    pub fn to_rgb8(&self) -> [u8; 3] {
        [to_byte(self.r), to_byte(self.g), to_byte(self.b)]
    }

    /// `#rrggbb` notation.
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

fn clamp_channel(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let r = Rect::from_xywh(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.width(), 30.0);
        assert_eq!(r.height(), 40.0);
        assert_eq!(r.origin(), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_rect_degenerate() {
        assert!(!Rect::from_xywh(0.0, 0.0, 25.0, 0.0).is_degenerate());
        assert!(Rect::from_xywh(5.0, 5.0, 0.0, 0.0).is_degenerate());
        assert!(Rect::new(10.0, 0.0, 0.0, 5.0).is_degenerate());
        assert!(Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersection(&b), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.intersection(&Rect::new(20.0, 20.0, 30.0, 30.0)), None);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_bounding() {
        let r = Rect::bounding([Point::new(3.0, 4.0), Point::new(-1.0, 8.0)]).unwrap();
        assert_eq!(r, Rect::new(-1.0, 4.0, 3.0, 8.0));
        assert!(Rect::bounding(Vec::new()).is_none());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Rgb::BLACK.to_hex(), "#000000");
        assert_eq!(Rgb::new(1.0, 0.5, 0.0).to_hex(), "#ff8000");
        assert_eq!(Rgb::from_cmyk(0.0, 0.0, 0.0, 1.0), Rgb::BLACK);
        assert_eq!(Rgb::new(2.0, -1.0, f32::NAN), Rgb::new(1.0, 0.0, 0.0));
    }
}
