//! Pipeline configuration.
//!
//! Every extraction and reconstruction option lives in [`PipelineConfig`],
//! which is handed to the [`DocumentAssembler`](crate::DocumentAssembler).

use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Markup pixels per native unit at 96 dpi over 72 points per inch.
pub const DEFAULT_DPI_SCALE: f32 = 96.0 / 72.0;

/// Options for extracting and rebuilding documents.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Markup pixels per native unit
    pub dpi_scale: f32,

    /// Background raster scale relative to `dpi_scale`
    pub background_oversample: f32,

    /// Discard images smaller than `min_image_pixels` on either side
    pub skip_decorative_images: bool,

    /// Decorative image threshold, device pixels per side
    pub min_image_pixels: u32,

    /// Maximum thickness of a divider, native units
    pub line_thickness_threshold: f32,

    /// Minimum length of a divider, native units
    pub line_min_length: f32,

    /// Maximum vertical gap between consecutive table rows, native units
    pub table_row_gap_max: f32,

    /// Column match tolerance, native units
    pub table_column_tolerance: f32,

    /// Quantization step used to group spans into rows
    pub table_row_quantum: f32,

    /// Run table detection
    pub detect_tables: bool,

    /// Produce a text-free background raster per page
    pub isolate_background: bool,

    /// Paint text boxes white on the background raster
    pub blank_text_regions: bool,

    /// Growth applied to each text box before it is redacted, native units
    pub redaction_padding: f32,

    /// Which style bit, if any, is read as underline
    pub underline_source: UnderlineSource,

    /// What to do with markup elements lacking `left`/`top`
    pub missing_position: MissingPositionPolicy,

    /// Pages to extract
    pub page_selection: PageSelection,

    /// Classify and emit pages in parallel
    pub parallel: bool,

    /// Persist images into this directory instead of inlining data URIs
    pub asset_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the markup pixel ratio.
    pub fn with_dpi_scale(mut self, scale: f32) -> Self {
        self.dpi_scale = scale;
        self
    }

    /// Set the background oversampling factor.
    pub fn with_background_oversample(mut self, factor: f32) -> Self {
        self.background_oversample = factor;
        self
    }

    /// Enable or disable decorative image skipping.
    pub fn with_skip_decorative_images(mut self, skip: bool) -> Self {
        self.skip_decorative_images = skip;
        self
    }

    /// Set the decorative image threshold.
    pub fn with_min_image_pixels(mut self, pixels: u32) -> Self {
        self.min_image_pixels = pixels;
        self
    }

    /// Set the divider thickness threshold.
    pub fn with_line_thickness_threshold(mut self, threshold: f32) -> Self {
        self.line_thickness_threshold = threshold;
        self
    }

    /// Set the minimum divider length.
    pub fn with_line_min_length(mut self, length: f32) -> Self {
        self.line_min_length = length;
        self
    }

    /// Set the maximum table row gap.
    pub fn with_table_row_gap_max(mut self, gap: f32) -> Self {
        self.table_row_gap_max = gap;
        self
    }

    /// Set the table column tolerance.
    pub fn with_table_column_tolerance(mut self, tolerance: f32) -> Self {
        self.table_column_tolerance = tolerance;
        self
    }

    /// Enable or disable table detection.
    pub fn with_tables(mut self, detect: bool) -> Self {
        self.detect_tables = detect;
        self
    }

    /// Enable or disable the background layer.
    pub fn with_background(mut self, isolate: bool) -> Self {
        self.isolate_background = isolate;
        self
    }

    /// Paint text boxes white on the background raster.
    ///
    /// Text is never rasterized, so this only matters for shading or images
    /// that sit under text; blanking removes those as well.
    pub fn with_blank_text_regions(mut self, blank: bool) -> Self {
        self.blank_text_regions = blank;
        self
    }

    /// Set the underline bit interpretation.
    pub fn with_underline_source(mut self, source: UnderlineSource) -> Self {
        self.underline_source = source;
        self
    }

    /// Set the missing position policy.
    pub fn with_missing_position(mut self, policy: MissingPositionPolicy) -> Self {
        self.missing_position = policy;
        self
    }

    /// Set page selection.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.page_selection = pages;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Persist images into a directory.
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }

    /// Scale used to rasterize background layers, in device pixels per native unit.
    pub fn background_scale(&self) -> f32 {
        self.dpi_scale * self.background_oversample
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi_scale: DEFAULT_DPI_SCALE,
            background_oversample: 1.5,
            skip_decorative_images: false,
            min_image_pixels: 5,
            line_thickness_threshold: 3.0,
            line_min_length: 20.0,
            table_row_gap_max: 30.0,
            table_column_tolerance: 5.0,
            table_row_quantum: 0.1,
            detect_tables: true,
            isolate_background: false,
            blank_text_regions: false,
            redaction_padding: 0.5,
            underline_source: UnderlineSource::None,
            missing_position: MissingPositionPolicy::Skip,
            page_selection: PageSelection::All,
            parallel: true,
            asset_dir: None,
        }
    }
}

/// Interpretation of the underline style bit.
///
/// Extractors disagree on where underline lives in the style bitmask: one
/// reads it from the monospace bit. No bit is read by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderlineSource {
    /// Never infer underline from the bitmask
    #[default]
    None,
    /// Read underline from bit 3, shared with monospace
    MonospaceBit,
    /// Read underline from an explicit bit position
    Bit(u8),
}

/// Handling of markup elements without `left` or `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPositionPolicy {
    /// Skip the element and record a diagnostic
    #[default]
    Skip,
    /// Place the element at the page origin
    DefaultToOrigin,
}

/// Page selection for extraction.
#[derive(Debug, Clone, Default)]
pub enum PageSelection {
    /// All pages
    #[default]
    All,
    /// A range of pages (inclusive, 1-indexed)
    Range(RangeInclusive<u32>),
    /// Specific pages (1-indexed)
    Pages(Vec<u32>),
}

impl PageSelection {
    /// Check if a page number should be included.
    pub fn includes(&self, page: u32) -> bool {
        match self {
            PageSelection::All => true,
            PageSelection::Range(range) => range.contains(&page),
            PageSelection::Pages(pages) => pages.contains(&page),
        }
    }

    /// Parse a page selection string (e.g., "1-10", "1,3,5,7-10").
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();

        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }

        if let Some((start, end)) = s.split_once('-') {
            if !start.contains(',') && !end.contains(',') {
                let start: u32 = start.trim().parse().map_err(|_| "Invalid start page")?;
                let end: u32 = end.trim().parse().map_err(|_| "Invalid end page")?;
                return Ok(PageSelection::Range(start..=end));
            }
        }

        let mut pages = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                let start: u32 = start.trim().parse().map_err(|_| "Invalid page number")?;
                let end: u32 = end.trim().parse().map_err(|_| "Invalid page number")?;
                for p in start..=end {
                    if !pages.contains(&p) {
                        pages.push(p);
                    }
                }
            } else {
                let p: u32 = part.parse().map_err(|_| "Invalid page number")?;
                if !pages.contains(&p) {
                    pages.push(p);
                }
            }
        }

        pages.sort();
        Ok(PageSelection::Pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!((config.dpi_scale - 96.0 / 72.0).abs() < 1e-6);
        assert!((config.background_scale() - 2.0).abs() < 1e-5);
        assert_eq!(config.line_thickness_threshold, 3.0);
        assert_eq!(config.table_row_gap_max, 30.0);
        assert_eq!(config.table_column_tolerance, 5.0);
        assert!(!config.skip_decorative_images);
        assert_eq!(config.missing_position, MissingPositionPolicy::Skip);
        assert_eq!(config.underline_source, UnderlineSource::None);
        assert!(!config.blank_text_regions);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_skip_decorative_images(true)
            .with_background(true)
            .with_missing_position(MissingPositionPolicy::DefaultToOrigin)
            .sequential();

        assert!(config.skip_decorative_images);
        assert!(config.isolate_background);
        assert!(!config.parallel);
        assert_eq!(config.missing_position, MissingPositionPolicy::DefaultToOrigin);
    }

    #[test]
    fn test_page_selection_includes() {
        let range = PageSelection::Range(5..=10);
        assert!(!range.includes(4));
        assert!(range.includes(5));
        assert!(range.includes(10));
        assert!(!range.includes(11));

        let pages = PageSelection::Pages(vec![1, 3]);
        assert!(pages.includes(3));
        assert!(!pages.includes(2));
    }

    #[test]
    fn test_page_selection_parse() {
        assert!(matches!(PageSelection::parse("all").unwrap(), PageSelection::All));
        assert!(matches!(PageSelection::parse("1-10").unwrap(), PageSelection::Range(_)));

        match PageSelection::parse("1,3,5-7,10").unwrap() {
            PageSelection::Pages(pages) => assert_eq!(pages, vec![1, 3, 5, 6, 7, 10]),
            other => panic!("Expected Pages variant, got {:?}", other),
        }

        assert!(PageSelection::parse("x-2").is_err());
    }
}
