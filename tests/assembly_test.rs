//! Integration tests for document assembly: partial failure and fallback.

mod common;

use common::{build_pdf, image, report_page, text};
use pagemark::error::Result;
use pagemark::model::{
    GeometricPrimitive, ImageRef, MarkupKind, PageInfo, Point, Rect, Rgb, TextRun,
};
use pagemark::parser::ImageData;
use pagemark::{
    extract_bytes, rebuild_html, render_html, DocumentAssembler, DocumentEngine, Error,
    HtmlOptions, LopdfBackend, MissingPositionPolicy, PipelineConfig, Severity,
};

/// Engine with `pages` letter pages and one text span each; `broken` pages fail.
struct MockEngine {
    pages: u32,
    broken: Vec<u32>,
}

impl DocumentEngine for MockEngine {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page(&self, number: u32) -> Result<PageInfo> {
        if number == 0 || number > self.pages {
            return Err(Error::PageOutOfRange(number, self.pages));
        }
        Ok(PageInfo::new(number, 612.0, 792.0))
    }

    fn primitives(&self, number: u32) -> Result<Vec<GeometricPrimitive>> {
        if self.broken.contains(&number) {
            return Err(Error::extraction(number, "unreadable content stream"));
        }
        Ok(vec![GeometricPrimitive::Text(TextRun {
            text: format!("Page {}", number),
            bbox: Rect::new(72.0, 88.0, 120.0, 102.4),
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
            color: Rgb::BLACK,
            flags: 0,
            origin: Point::new(72.0, 100.0),
        })])
    }

    fn image_data(&self, number: u32, image: &ImageRef) -> Result<ImageData> {
        Err(Error::extraction(number, format!("no image {}", image.0)))
    }
}

#[test]
fn test_failed_page_is_reported_and_others_kept() {
    let engine = MockEngine {
        pages: 10,
        broken: vec![5],
    };
    let assembler = DocumentAssembler::new(PipelineConfig::new()).unwrap();
    let extraction = assembler.extract(&engine).unwrap();

    let numbers: Vec<u32> = extraction.pages.iter().map(|p| p.info.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    assert_eq!(extraction.metadata.page_count, 10);

    let failures: Vec<_> = extraction.diagnostics.for_page(5).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].severity, Severity::Page);
    assert!(matches!(failures[0].error, Error::Extraction { page: 5, .. }));
    assert_eq!(extraction.diagnostics.len(), 1);

    assert_eq!(
        extraction.pages[3].markup.elements[0].text(),
        Some("Page 4")
    );
}

#[test]
fn test_every_page_failing_still_returns() {
    let engine = MockEngine {
        pages: 3,
        broken: vec![1, 2, 3],
    };
    let extraction = DocumentAssembler::new(PipelineConfig::new().sequential())
        .unwrap()
        .extract(&engine)
        .unwrap();
    assert_eq!(extraction.page_count(), 0);
    assert_eq!(extraction.diagnostics.len(), 3);
}

#[test]
fn test_empty_document_is_fatal() {
    let engine = MockEngine {
        pages: 0,
        broken: vec![],
    };
    let result = DocumentAssembler::new(PipelineConfig::new())
        .unwrap()
        .extract(&engine);
    assert!(matches!(result, Err(Error::Assembly(_))));
}

#[test]
fn test_unusable_markup_falls_back_to_original_pages() {
    let original = build_pdf(&[
        (612.0, 792.0, report_page()),
        (842.0, 595.0, vec![text(72.0, 100.0, "Wide", 12.0)]),
    ]);

    let rebuilt = rebuild_html(
        "<<<this is not markup>>>",
        None,
        Some(&original),
        PipelineConfig::default(),
    )
    .unwrap();

    assert!(rebuilt.fallback);
    assert_eq!(rebuilt.page_count, 2);
    assert!(rebuilt
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Document));

    let copy = LopdfBackend::load_bytes(&rebuilt.pdf).unwrap();
    assert_eq!(copy.page_count(), 2);
    let wide = copy.page(2).unwrap();
    assert_eq!((wide.width, wide.height), (842.0, 595.0));

    // Copied pages keep their content
    let extraction = extract_bytes(&rebuilt.pdf, PipelineConfig::default()).unwrap();
    assert_eq!(
        extraction.pages[1].markup.elements[0].text(),
        Some("Wide")
    );
}

#[test]
fn test_unusable_markup_without_original_is_fatal() {
    let result = rebuild_html("<html><body><p>loose</p></body></html>", None, None, PipelineConfig::default());
    assert!(matches!(result, Err(Error::Assembly(_))));
}

const HAND_EDITED: &str = r#"<!DOCTYPE html>
<html><head><meta name="title" content="Edited"></head>
<body>
<div class="pdf-page-container" data-page-number="1" data-page-width="612" data-page-height="792" style="position: relative; width: 816px; height: 1056px;">
  <div class="pdf-element pdf-text" data-kind="text" style="position: absolute; left: 96px; top: 96px; font-size: 16px;">Placed</div>
  <div class="pdf-element pdf-text" data-kind="text" style="position: absolute; font-size: 16px;">Nowhere</div>
  <div class="toolbar"><div style="position: absolute; left: 0px; top: 0px;">Save</div></div>
</div>
</body></html>"#;

#[test]
fn test_unpositioned_elements_are_skipped_with_diagnostics() {
    let rebuilt = rebuild_html(HAND_EDITED, None, None, PipelineConfig::default()).unwrap();
    assert!(!rebuilt.fallback);
    assert_eq!(rebuilt.page_count, 1);
    assert_eq!(rebuilt.diagnostics.len(), 1);
    assert_eq!(rebuilt.diagnostics.iter().next().unwrap().severity, Severity::Element);

    let extraction = extract_bytes(&rebuilt.pdf, PipelineConfig::default()).unwrap();
    let texts: Vec<_> = extraction.pages[0]
        .markup
        .elements
        .iter()
        .filter_map(|e| e.text())
        .collect();
    assert_eq!(texts, vec!["Placed"]);
    assert_eq!(extraction.metadata.title.as_deref(), Some("Edited"));
}

#[test]
fn test_unpositioned_elements_default_to_origin() {
    let config = PipelineConfig::new().with_missing_position(MissingPositionPolicy::DefaultToOrigin);
    let rebuilt = rebuild_html(HAND_EDITED, None, None, config).unwrap();
    assert!(rebuilt.diagnostics.is_empty());

    let extraction = extract_bytes(&rebuilt.pdf, PipelineConfig::default()).unwrap();
    let page = &extraction.pages[0].markup;
    assert_eq!(page.count(MarkupKind::Text), 2);
    let nowhere = page
        .elements
        .iter()
        .find(|e| e.text() == Some("Nowhere"))
        .unwrap();
    assert!(nowhere.left.unwrap().value.abs() < 0.01);
}

#[test]
fn test_asset_directory_output_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    let pdf = build_pdf(&[(612.0, 792.0, vec![image(100.0, 100.0, 200.0, 150.0)])]);

    let config = PipelineConfig::new().with_asset_dir(&assets);
    let extraction = extract_bytes(&pdf, config).unwrap();
    let written: Vec<_> = std::fs::read_dir(&assets)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written.len(), 1);
    assert!(written[0].starts_with("p1_img"));

    let html = render_html(&extraction, &HtmlOptions::default());
    assert!(html.contains(&written[0]));
    assert!(!html.contains("data:image/"));

    let html_path = dir.path().join("page.html");
    std::fs::write(&html_path, &html).unwrap();
    let rebuilt = pagemark::rebuild_file(&html_path, None::<&str>, PipelineConfig::default()).unwrap();
    assert!(rebuilt.diagnostics.is_empty(), "{:?}", rebuilt.diagnostics);

    let again = extract_bytes(&rebuilt.pdf, PipelineConfig::default()).unwrap();
    assert_eq!(again.pages[0].markup.count(MarkupKind::Image), 1);
}

#[test]
fn test_background_layer_is_written_first() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = build_pdf(&[(612.0, 792.0, report_page())]);

    let config = PipelineConfig::new()
        .with_background(true)
        .with_asset_dir(dir.path());
    let extraction = extract_bytes(&pdf, config).unwrap();
    assert!(extraction.pages[0].markup.background.is_some());
    assert!(dir.path().join("p1_background.png").exists());

    let html = render_html(&extraction, &HtmlOptions::default());
    let background = html.find("data-kind=\"background\"").unwrap();
    let first_element = html.find("pdf-element").unwrap();
    assert!(background < first_element);
}
