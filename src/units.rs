//! Conversion between native units and markup pixels.
//!
//! Native units are points (72 per inch); markup units are CSS pixels
//! (96 per inch). The mapping is linear and invertible:
//! `pixel = native * ratio`.

use crate::config::DEFAULT_DPI_SCALE;
use crate::error::{Error, Result};
use crate::model::{Length, Rect, Unit};

/// Convert a native dimension to markup pixels.
pub fn to_markup_units(native: f32, ratio: f32) -> Result<f32> {
    check_ratio(ratio)?;
    check_dimension(native)?;
    Ok(native * ratio)
}

/// Convert a markup pixel dimension to native units.
pub fn to_native(pixels: f32, ratio: f32) -> Result<f32> {
    check_ratio(ratio)?;
    check_dimension(pixels)?;
    Ok(pixels / ratio)
}

fn check_ratio(ratio: f32) -> Result<()> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(())
    } else {
        Err(Error::UnitConversion(format!("invalid ratio {}", ratio)))
    }
}

fn check_dimension(value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::UnitConversion(format!("non-finite value {}", value)));
    }
    if value < 0.0 {
        return Err(Error::UnitConversion(format!("negative dimension {}", value)));
    }
    Ok(())
}

fn check_finite(value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::UnitConversion(format!("non-finite value {}", value)))
    }
}

/// Maps values between native and markup space with a fixed ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    ratio: f32,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_DPI_SCALE,
        }
    }
}

impl CoordinateMapper {
    /// Create a mapper. The ratio must be finite and positive.
    pub fn new(ratio: f32) -> Result<Self> {
        check_ratio(ratio)?;
        Ok(Self { ratio })
    }

    /// Markup pixels per native unit.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Dimension, native to pixels. Negative values are rejected.
    pub fn to_markup_units(&self, native: f32) -> Result<f32> {
        to_markup_units(native, self.ratio)
    }

    /// Dimension, pixels to native. Negative values are rejected.
    pub fn to_native(&self, pixels: f32) -> Result<f32> {
        to_native(pixels, self.ratio)
    }

    /// Coordinate, native to pixels. Negative offsets are allowed.
    pub fn coord_to_markup(&self, native: f32) -> Result<f32> {
        check_finite(native)?;
        Ok(native * self.ratio)
    }

    /// Coordinate, pixels to native. Negative offsets are allowed.
    pub fn coord_to_native(&self, pixels: f32) -> Result<f32> {
        check_finite(pixels)?;
        Ok(pixels / self.ratio)
    }

    /// Map a native rectangle to pixels.
    ///
    /// Zero-width or zero-height rectangles pass through; inverted ones are
    /// rejected as negative dimensions.
    pub fn rect_to_markup(&self, rect: &Rect) -> Result<Rect> {
        self.map_rect(rect, |v| v * self.ratio)
    }

    /// Map a pixel rectangle to native units.
    pub fn rect_to_native(&self, rect: &Rect) -> Result<Rect> {
        self.map_rect(rect, |v| v / self.ratio)
    }

    fn map_rect(&self, rect: &Rect, f: impl Fn(f32) -> f32) -> Result<Rect> {
        if !rect.is_finite() {
            return Err(Error::UnitConversion(format!("non-finite rectangle {:?}", rect)));
        }
        check_dimension(rect.width())?;
        check_dimension(rect.height())?;
        Ok(Rect::new(f(rect.x0), f(rect.y0), f(rect.x1), f(rect.y1)))
    }

    /// Resolve a percentage of a container into pixels.
    pub fn percent_to_px(&self, percent: f32, container_px: f32) -> Result<f32> {
        check_finite(percent)?;
        check_dimension(container_px)?;
        Ok(percent / 100.0 * container_px)
    }

    /// Express pixels as a percentage of a container.
    pub fn px_to_percent(&self, pixels: f32, container_px: f32) -> Result<f32> {
        check_finite(pixels)?;
        check_dimension(container_px)?;
        if container_px == 0.0 {
            return Err(Error::UnitConversion("zero-sized container".to_string()));
        }
        Ok(pixels / container_px * 100.0)
    }

    /// Resolve a markup length to pixels against a container size in pixels.
    pub fn resolve_px(&self, length: Length, container_px: f32) -> Result<f32> {
        check_finite(length.value)?;
        match length.unit {
            Unit::Px => Ok(length.value),
            Unit::Percent => self.percent_to_px(length.value, container_px),
            Unit::Pt => Ok(length.value * self.ratio),
        }
    }

    /// Normalize a position (may be negative) to native units.
    pub fn normalize_coordinate(&self, length: Length, container_px: f32) -> Result<f32> {
        let px = self.resolve_px(length, container_px)?;
        self.coord_to_native(px)
    }

    /// Normalize a size (must be non-negative) to native units.
    pub fn normalize_dimension(&self, length: Length, container_px: f32) -> Result<f32> {
        let px = self.resolve_px(length, container_px)?;
        self.to_native(px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_law() {
        let mapper = CoordinateMapper::default();
        for v in [0.0f32, 0.5, 1.0, 12.0, 72.0, 595.0, 842.0, 10_000.0] {
            let back = mapper.to_native(mapper.to_markup_units(v).unwrap()).unwrap();
            assert!((back - v).abs() <= v.abs() * 1e-6 + 1e-6, "{} -> {}", v, back);
        }
    }

    #[test]
    fn test_standard_ratio() {
        assert!((to_markup_units(72.0, DEFAULT_DPI_SCALE).unwrap() - 96.0).abs() < 1e-4);
        assert!((to_native(96.0, DEFAULT_DPI_SCALE).unwrap() - 72.0).abs() < 1e-4);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mapper = CoordinateMapper::default();
        assert!(matches!(mapper.to_markup_units(-1.0), Err(Error::UnitConversion(_))));
        assert!(mapper.to_native(f32::NAN).is_err());
        assert!(mapper.to_markup_units(f32::INFINITY).is_err());
        assert!(CoordinateMapper::new(0.0).is_err());
        assert!(mapper.coord_to_markup(-10.0).is_ok());
    }

    #[test]
    fn test_degenerate_rect_passes_through() {
        let mapper = CoordinateMapper::new(2.0).unwrap();
        let divider = Rect::new(10.0, 50.0, 110.0, 50.0);
        assert_eq!(
            mapper.rect_to_markup(&divider).unwrap(),
            Rect::new(20.0, 100.0, 220.0, 100.0)
        );
        assert!(mapper.rect_to_markup(&Rect::new(10.0, 0.0, 0.0, 5.0)).is_err());
    }

    #[test]
    fn test_percentages() {
        let mapper = CoordinateMapper::default();
        assert_eq!(mapper.percent_to_px(50.0, 800.0).unwrap(), 400.0);
        assert_eq!(mapper.px_to_percent(200.0, 800.0).unwrap(), 25.0);
        assert!(mapper.px_to_percent(1.0, 0.0).is_err());
    }

    #[test]
    fn test_normalize_lengths() {
        let mapper = CoordinateMapper::default();
        let native = mapper
            .normalize_dimension(Length::percent(50.0), 192.0)
            .unwrap();
        assert!((native - 72.0).abs() < 1e-4);
        let native = mapper.normalize_dimension(Length::pt(36.0), 0.0).unwrap();
        assert!((native - 36.0).abs() < 1e-4);
        assert!(mapper.normalize_dimension(Length::px(-4.0), 0.0).is_err());
        assert!(mapper.normalize_coordinate(Length::px(-4.0), 0.0).is_ok());
    }
}
