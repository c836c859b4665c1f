//! Partition a page's primitives into semantic elements.
//!
//! Text runs become spans, image placements become raster images, and
//! vector paths are screened for thin dividers before falling through to
//! generic shapes. Each primitive is classified on its own: one that fails
//! is reported and the rest of the page continues.

use unicode_normalization::UnicodeNormalization;

use crate::config::{PipelineConfig, UnderlineSource};
use crate::error::{Diagnostics, Error, Result};
use crate::model::{
    ClassifiedElement, ElementKind, GeometricPrimitive, ImagePlacement, PathItem, Rect,
    StyleFlags, StyleRecord, TextRun, VectorPath,
};
use crate::render::fonts::web_safe_family;
use crate::units::CoordinateMapper;

/// Thresholds used by [`ElementClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Discard images below `min_image_pixels`
    pub skip_decorative_images: bool,
    /// Decorative threshold per side, device pixels
    pub min_image_pixels: u32,
    /// Maximum divider thickness, native units
    pub line_thickness: f32,
    /// Minimum divider length, native units
    pub line_min_length: f32,
    pub underline_source: UnderlineSource,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ClassifierConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            skip_decorative_images: config.skip_decorative_images,
            min_image_pixels: config.min_image_pixels,
            line_thickness: config.line_thickness_threshold,
            line_min_length: config.line_min_length,
            underline_source: config.underline_source,
        }
    }
}

/// Geometric heuristics that tag primitives with a role.
pub struct ElementClassifier {
    config: ClassifierConfig,
    mapper: CoordinateMapper,
}

impl ElementClassifier {
    pub fn new(config: ClassifierConfig, mapper: CoordinateMapper) -> Self {
        Self { config, mapper }
    }

    /// Classify every primitive of a page.
    ///
    /// Output order follows input order. Failures are returned as
    /// element-level diagnostics indexed by primitive position.
    pub fn classify(
        &self,
        page: u32,
        primitives: &[GeometricPrimitive],
    ) -> (Vec<ClassifiedElement>, Diagnostics) {
        let mut elements = Vec::with_capacity(primitives.len());
        let mut diagnostics = Diagnostics::new();

        for (index, prim) in primitives.iter().enumerate() {
            match self.classify_one(page, prim) {
                Ok(Some(element)) => elements.push(element),
                Ok(None) => {}
                Err(e) => diagnostics.element(page, index, e),
            }
        }

        log::debug!(
            "page {}: {} primitives classified into {} elements",
            page,
            primitives.len(),
            elements.len()
        );
        (elements, diagnostics)
    }

    /// Classify one primitive. `Ok(None)` means it was discarded.
    pub fn classify_one(
        &self,
        page: u32,
        prim: &GeometricPrimitive,
    ) -> Result<Option<ClassifiedElement>> {
        match prim {
            GeometricPrimitive::Text(run) => self.classify_text(page, run),
            GeometricPrimitive::Image(image) => self.classify_image(page, image),
            GeometricPrimitive::Path(path) => self.classify_path(page, path),
        }
    }

    fn element(&self, page: u32, bbox: Rect, style: StyleRecord, kind: ElementKind) -> Result<ClassifiedElement> {
        let pixel_bbox = self.mapper.rect_to_markup(&bbox)?;
        Ok(ClassifiedElement {
            page,
            bbox,
            pixel_bbox,
            style,
            kind,
        })
    }

    fn classify_text(&self, page: u32, run: &TextRun) -> Result<Option<ClassifiedElement>> {
        if run.text.trim().is_empty() {
            return Ok(None);
        }
        if !run.bbox.is_finite() || !run.origin.is_finite() {
            return Err(Error::Classification(format!(
                "text run {:?} has non-finite geometry",
                run.text
            )));
        }
        if !run.font_size.is_finite() || run.font_size <= 0.0 {
            return Err(Error::Classification(format!(
                "text run {:?} has invalid font size {}",
                run.text, run.font_size
            )));
        }

        let flags = StyleFlags::decode(run.flags, self.config.underline_source);
        let style = StyleRecord {
            font_family: web_safe_family(&run.font_name).to_string(),
            font_size: run.font_size,
            weight: if flags.bold { 700 } else { 400 },
            flags,
            color: run.color,
            ..StyleRecord::default()
        };
        let kind = ElementKind::TextSpan {
            text: run.text.nfc().collect(),
            origin: run.origin,
        };
        self.element(page, run.bbox, style, kind).map(Some)
    }

    fn classify_image(&self, page: u32, image: &ImagePlacement) -> Result<Option<ClassifiedElement>> {
        if !image.bbox.is_finite() || image.bbox.is_degenerate() {
            return Err(Error::Classification(format!(
                "image {} has an invalid placement {:?}",
                image.image_ref, image.bbox
            )));
        }
        let min = self.config.min_image_pixels;
        if self.config.skip_decorative_images && (image.pixel_width < min || image.pixel_height < min) {
            log::debug!(
                "page {}: skipping decorative image {} ({}x{})",
                page,
                image.image_ref,
                image.pixel_width,
                image.pixel_height
            );
            return Ok(None);
        }

        let kind = ElementKind::RasterImage {
            image_ref: image.image_ref.clone(),
            pixel_width: image.pixel_width,
            pixel_height: image.pixel_height,
        };
        self.element(page, image.bbox, StyleRecord::default(), kind)
            .map(Some)
    }

    fn classify_path(&self, page: u32, path: &VectorPath) -> Result<Option<ClassifiedElement>> {
        if path.bbox.is_degenerate() {
            log::debug!("page {}: discarding degenerate path {:?}", page, path.bbox);
            return Ok(None);
        }

        let style = StyleRecord {
            color: path.stroke_color.or(path.fill_color).unwrap_or_default(),
            fill: path.fill_color,
            stroke_width: path.stroke_width,
            opacity: path.opacity,
            ..StyleRecord::default()
        };

        let kind = if self.is_divider(path) {
            ElementKind::Divider {
                items: path.items.clone(),
            }
        } else {
            ElementKind::VectorShape {
                items: path.items.clone(),
                stroke: path.stroke_color,
                even_odd: path.even_odd,
            }
        };
        self.element(page, path.bbox, style, kind).map(Some)
    }

    /// A thin, long horizontal path made of one line or one filled rectangle.
    ///
    /// Thin vertical paths stay vectors.
    pub fn is_divider(&self, path: &VectorPath) -> bool {
        let single_item = match path.items.as_slice() {
            [PathItem::Line { .. }] => path.stroke_color.is_some() || path.fill_color.is_some(),
            [PathItem::Rect { .. }] => path.fill_color.is_some(),
            _ => false,
        };
        if !single_item {
            return false;
        }

        let (w, h) = (path.bbox.width(), path.bbox.height());
        let thin = self.config.line_thickness;
        let long = self.config.line_min_length;
        h < thin && w > long
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{style_bits, ImageRef, Point, Rgb};

    fn classifier() -> ElementClassifier {
        ElementClassifier::new(ClassifierConfig::default(), CoordinateMapper::default())
    }

    fn text(s: &str) -> GeometricPrimitive {
        GeometricPrimitive::Text(TextRun {
            text: s.to_string(),
            bbox: Rect::new(72.0, 88.0, 120.0, 102.4),
            font_name: "ABCDEF+TimesNewRomanPS-BoldMT".to_string(),
            font_size: 12.0,
            color: Rgb::new(1.0, 0.0, 0.0),
            flags: style_bits::BOLD | style_bits::SERIF,
            origin: Point::new(72.0, 100.0),
        })
    }

    fn filled_rect(w: f32, h: f32) -> GeometricPrimitive {
        let rect = Rect::from_xywh(10.0, 100.0, w, h);
        GeometricPrimitive::Path(VectorPath {
            bbox: rect,
            items: vec![PathItem::Rect { rect }],
            stroke_color: None,
            fill_color: Some(Rgb::BLACK),
            stroke_width: 0.0,
            opacity: 1.0,
            even_odd: false,
        })
    }

    fn image(w: u32, h: u32) -> GeometricPrimitive {
        GeometricPrimitive::Image(ImagePlacement {
            image_ref: ImageRef("7 0".into()),
            bbox: Rect::new(0.0, 0.0, 3.0, 3.0),
            pixel_width: w,
            pixel_height: h,
            color_depth: 8,
        })
    }

    fn kind_of(prim: GeometricPrimitive) -> Option<&'static str> {
        classifier()
            .classify_one(1, &prim)
            .unwrap()
            .map(|e| e.kind.name())
    }

    #[test]
    fn test_text_span_style() {
        let element = classifier().classify_one(1, &text("Hello")).unwrap().unwrap();
        assert_eq!(element.text(), Some("Hello"));
        assert_eq!(element.style.font_family, "'Times New Roman', Times, serif");
        assert_eq!(element.style.weight, 700);
        assert!(element.style.flags.serif);
        assert!(!element.style.flags.underline);
        assert_eq!(element.style.color_hex(), "#ff0000");
        assert!((element.pixel_bbox.x0 - 96.0).abs() < 1e-4);
    }

    #[test]
    fn test_text_is_nfc_normalized() {
        let element = classifier()
            .classify_one(1, &text("Cafe\u{301}"))
            .unwrap()
            .unwrap();
        assert_eq!(element.text(), Some("Caf\u{e9}"));
    }

    #[test]
    fn test_empty_text_discarded() {
        assert_eq!(kind_of(text("   \t")), None);
    }

    #[test]
    fn test_divider_boundary() {
        assert_eq!(kind_of(filled_rect(25.0, 2.0)), Some("line"));
        assert_eq!(kind_of(filled_rect(25.0, 5.0)), Some("vector"));
        assert_eq!(kind_of(filled_rect(15.0, 2.0)), Some("vector"));
    }

    #[test]
    fn test_vertical_rule_stays_vector() {
        assert_eq!(kind_of(filled_rect(2.0, 40.0)), Some("vector"));
        assert_eq!(kind_of(filled_rect(1.0, 100.0)), Some("vector"));
    }

    #[test]
    fn test_zero_height_stroked_line_is_divider() {
        let line = GeometricPrimitive::Path(VectorPath {
            bbox: Rect::new(10.0, 50.0, 200.0, 50.0),
            items: vec![PathItem::Line {
                from: Point::new(10.0, 50.0),
                to: Point::new(200.0, 50.0),
            }],
            stroke_color: Some(Rgb::gray(0.5)),
            fill_color: None,
            stroke_width: 1.0,
            opacity: 1.0,
            even_odd: false,
        });
        assert_eq!(kind_of(line), Some("line"));
    }

    #[test]
    fn test_degenerate_shape_discarded() {
        assert_eq!(kind_of(filled_rect(0.0, 0.0)), None);
        let mut prim = filled_rect(10.0, 10.0);
        if let GeometricPrimitive::Path(path) = &mut prim {
            path.bbox = Rect::new(f32::NAN, 0.0, 1.0, 1.0);
        }
        assert_eq!(kind_of(prim), None);
    }

    #[test]
    fn test_tiny_images_kept_by_default() {
        assert_eq!(kind_of(image(2, 2)), Some("image"));

        let config = ClassifierConfig {
            skip_decorative_images: true,
            ..ClassifierConfig::default()
        };
        let skipping = ElementClassifier::new(config, CoordinateMapper::default());
        assert!(skipping.classify_one(1, &image(2, 2)).unwrap().is_none());
        assert!(skipping.classify_one(1, &image(50, 50)).unwrap().is_some());
    }

    #[test]
    fn test_bad_primitive_does_not_stop_page() {
        let mut bad = text("Broken");
        if let GeometricPrimitive::Text(run) = &mut bad {
            run.font_size = f32::INFINITY;
        }
        let prims = vec![text("First"), bad, filled_rect(25.0, 2.0)];
        let (elements, diagnostics) = classifier().classify(3, &prims);
        assert_eq!(elements.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        let diag = diagnostics.iter().next().unwrap();
        assert_eq!((diag.page, diag.element), (Some(3), Some(1)));
    }

    #[test]
    fn test_underline_source() {
        let config = ClassifierConfig {
            underline_source: UnderlineSource::MonospaceBit,
            ..ClassifierConfig::default()
        };
        let c = ElementClassifier::new(config, CoordinateMapper::default());
        let mut prim = text("Code");
        if let GeometricPrimitive::Text(run) = &mut prim {
            run.flags = style_bits::MONOSPACE;
        }
        let element = c.classify_one(1, &prim).unwrap().unwrap();
        assert!(element.style.flags.underline);
        assert!(element.style.flags.monospace);
    }
}
