//! Text-free page rasters.
//!
//! The rasterizer never draws glyphs, so the raster keeps images and vector
//! art and nothing else. Shading under a text span stays visible. With
//! `blank_text_regions` set, each text box is additionally painted white,
//! which also erases whatever graphics lie under it. The raster sits under
//! all reconstructed elements.

use super::backend::DocumentEngine;
use super::raster::Raster;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::model::{ClassifiedElement, ElementKind, PageInfo, Rect};

/// Produces the graphics-only layer of a page.
#[derive(Debug, Clone)]
pub struct BackgroundIsolator {
    /// Device pixels per native unit
    scale: f32,
    /// Growth of each redaction box, native units
    padding: f32,
    /// Paint redaction boxes white
    blank_text: bool,
}

impl BackgroundIsolator {
    pub fn new(scale: f32, padding: f32) -> Self {
        Self {
            scale,
            padding,
            blank_text: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.background_scale(), config.redaction_padding)
            .with_text_blanking(config.blank_text_regions)
    }

    pub fn with_text_blanking(mut self, blank: bool) -> Self {
        self.blank_text = blank;
        self
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Redaction boxes for the text-bearing elements of a page.
    ///
    /// Spans and table regions are redacted; images and shapes are not.
    pub fn redactions(&self, page: &PageInfo, elements: &[ClassifiedElement]) -> Vec<Rect> {
        let bounds = Rect::new(0.0, 0.0, page.width, page.height);
        elements
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    ElementKind::TextSpan { .. } | ElementKind::TableRegion(_)
                )
            })
            .map(|e| e.bbox.expand(self.padding).clamp_to(&bounds))
            .filter(|r| r.width() > 0.0 && r.height() > 0.0)
            .collect()
    }

    /// Rasterize `page` with its text removed.
    pub fn isolate<E: DocumentEngine + ?Sized>(
        &self,
        engine: &E,
        page: &PageInfo,
        elements: &[ClassifiedElement],
    ) -> Result<Raster> {
        let redactions = if self.blank_text {
            self.redactions(page, elements)
        } else {
            Vec::new()
        };
        log::debug!(
            "page {}: rasterizing background at {:.2}x with {} redactions",
            page.number,
            self.scale,
            redactions.len()
        );
        engine
            .rasterize(page.number, &redactions, self.scale)
            .map_err(|e| Error::extraction(page.number, format!("background: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageRef, PathItem, Point, Rgb, StyleRecord};
    use crate::parser::LopdfBackend;
    use crate::rebuild::{PdfWriter, PlacementCommand, ShapePlacementStyle};

    fn element(bbox: Rect, kind: ElementKind) -> ClassifiedElement {
        ClassifiedElement {
            page: 1,
            bbox,
            pixel_bbox: bbox,
            style: StyleRecord::default(),
            kind,
        }
    }

    #[test]
    fn test_only_text_is_redacted() {
        let page = PageInfo::new(1, 200.0, 100.0);
        let elements = vec![
            element(
                Rect::new(10.0, 10.0, 50.0, 22.0),
                ElementKind::TextSpan {
                    text: "Hi".into(),
                    origin: Point::new(10.0, 20.0),
                },
            ),
            element(
                Rect::new(60.0, 10.0, 90.0, 40.0),
                ElementKind::RasterImage {
                    image_ref: ImageRef("5 0".into()),
                    pixel_width: 10,
                    pixel_height: 10,
                },
            ),
            element(
                Rect::new(190.0, 90.0, 210.0, 110.0),
                ElementKind::TextSpan {
                    text: "edge".into(),
                    origin: Point::new(190.0, 100.0),
                },
            ),
        ];
        let isolator = BackgroundIsolator::new(2.0, 0.5);
        let boxes = isolator.redactions(&page, &elements);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], Rect::new(9.5, 9.5, 50.5, 22.5));
        assert_eq!(boxes[1], Rect::new(189.5, 89.5, 200.0, 100.0));
    }

    /// A page with a blue box, and a text span lying over its left half.
    fn shaded_page() -> (LopdfBackend, PageInfo, Vec<ClassifiedElement>) {
        let rect = Rect::new(20.0, 20.0, 120.0, 60.0);
        let mut writer = PdfWriter::new();
        writer
            .add_page(
                200.0,
                100.0,
                &[PlacementCommand::PlaceVector {
                    position: Point::new(rect.x0, rect.y0),
                    width: rect.width(),
                    height: rect.height(),
                    style: ShapePlacementStyle {
                        stroke: None,
                        fill: Some(Rgb::new(0.0, 0.0, 1.0)),
                        stroke_width: 0.0,
                        opacity: 1.0,
                    },
                    path: vec![PathItem::Rect { rect }],
                }],
            )
            .unwrap();
        let backend = LopdfBackend::load_bytes(&writer.finish().unwrap()).unwrap();
        let span = element(
            Rect::new(25.0, 30.0, 70.0, 50.0),
            ElementKind::TextSpan {
                text: "Shaded".into(),
                origin: Point::new(25.0, 46.0),
            },
        );
        (backend, PageInfo::new(1, 200.0, 100.0), vec![span])
    }

    fn pixel(raster: &Raster, x: u32, y: u32) -> [u8; 4] {
        image::load_from_memory(&raster.png).unwrap().to_rgba8().get_pixel(x, y).0
    }

    #[test]
    fn test_shading_under_text_stays_visible() {
        let (backend, page, elements) = shaded_page();
        let raster = BackgroundIsolator::new(1.0, 0.5)
            .isolate(&backend, &page, &elements)
            .unwrap();
        assert_eq!(pixel(&raster, 40, 40), [0, 0, 255, 255]);
        assert_eq!(pixel(&raster, 100, 40), [0, 0, 255, 255]);
    }

    #[test]
    fn test_text_blanking_is_opt_in() {
        let (backend, page, elements) = shaded_page();
        let config = PipelineConfig::new()
            .with_background_oversample(1.0 / PipelineConfig::new().dpi_scale)
            .with_blank_text_regions(true);
        let isolator = BackgroundIsolator::from_config(&config);
        assert!((isolator.scale() - 1.0).abs() < 1e-5);

        let raster = isolator.isolate(&backend, &page, &elements).unwrap();
        assert_eq!(pixel(&raster, 40, 40), [255, 255, 255, 255]);
        assert_eq!(pixel(&raster, 100, 40), [0, 0, 255, 255]);
    }
}
