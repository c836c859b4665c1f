//! # pagemark
//!
//! Turn PDF pages into editable, absolutely positioned HTML and rebuild a
//! PDF from the edited markup.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pagemark::{extract_file, rebuild_file, render_html, HtmlOptions, PipelineConfig};
//!
//! fn main() -> pagemark::Result<()> {
//!     // PDF to HTML
//!     let extraction = extract_file("document.pdf")?;
//!     let html = render_html(&extraction, &HtmlOptions::default());
//!     std::fs::write("document.html", html)?;
//!
//!     // ...edit document.html...
//!
//!     // HTML back to PDF, falling back to the original pages if nothing can be placed
//!     let rebuilt = rebuild_file("document.html", Some("document.pdf"), PipelineConfig::default())?;
//!     std::fs::write("edited.pdf", rebuilt.pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! - **Extraction**: [`DocumentEngine`] primitives are classified
//!   ([`ElementClassifier`]), grouped into tables ([`TableDetector`]) and
//!   emitted as pixel-positioned markup ([`MarkupEmitter`]). An optional
//!   text-free background raster comes from [`BackgroundIsolator`].
//! - **Reconstruction**: markup is read back ([`MarkupReader`]), turned into
//!   placement commands ([`ElementReconstructor`]) and written with
//!   [`PdfWriter`].
//! - Recoverable failures never abort a document; they are collected in
//!   [`Diagnostics`] next to the result.

pub mod assembler;
pub mod config;
pub mod detect;
pub mod error;
pub mod markup;
pub mod model;
pub mod parser;
pub mod rebuild;
pub mod render;
pub mod units;

// Re-export commonly used types
pub use assembler::{DocumentAssembler, ExtractedPage, Extraction, Reconstruction};
pub use config::{MissingPositionPolicy, PageSelection, PipelineConfig, UnderlineSource};
pub use detect::{detect_from_bytes, detect_from_path, is_pdf, InputKind, PdfFormat};
pub use error::{Diagnostic, Diagnostics, Error, Result, Severity};
pub use markup::{HtmlTree, MarkupDocument, MarkupReader, MarkupTree};
pub use model::{
    ClassifiedElement, ElementKind, GeometricPrimitive, MarkupElement, MarkupPage, Metadata,
    PageInfo, Point, Rect, TableRegion,
};
pub use parser::{
    BackgroundIsolator, DocumentEngine, ElementClassifier, LopdfBackend, TableDetector,
};
pub use rebuild::{ElementReconstructor, PlacementCommand, PdfWriter};
pub use render::{HtmlOptions, JsonFormat, MarkupEmitter};
pub use units::CoordinateMapper;

use std::path::Path;

/// Open a PDF, refusing encrypted documents.
fn open_pdf(backend: LopdfBackend) -> Result<LopdfBackend> {
    if backend.is_encrypted() {
        return Err(Error::Encrypted);
    }
    Ok(backend)
}

/// Extract a PDF file with the default configuration.
///
/// # Example
///
/// ```no_run
/// let extraction = pagemark::extract_file("document.pdf").unwrap();
/// println!("Pages: {}", extraction.page_count());
/// ```
pub fn extract_file<P: AsRef<Path>>(path: P) -> Result<Extraction> {
    extract_file_with_config(path, PipelineConfig::default())
}

/// Extract a PDF file with a custom configuration.
///
/// # Example
///
/// ```no_run
/// use pagemark::{extract_file_with_config, PipelineConfig};
///
/// let config = PipelineConfig::new()
///     .with_background(true)
///     .with_asset_dir("./assets");
/// let extraction = extract_file_with_config("document.pdf", config).unwrap();
/// ```
pub fn extract_file_with_config<P: AsRef<Path>>(path: P, config: PipelineConfig) -> Result<Extraction> {
    let backend = open_pdf(LopdfBackend::load_file(path)?)?;
    DocumentAssembler::new(config)?.extract(&backend)
}

/// Extract a PDF held in memory.
pub fn extract_bytes(data: &[u8], config: PipelineConfig) -> Result<Extraction> {
    let backend = open_pdf(LopdfBackend::load_bytes(data)?)?;
    DocumentAssembler::new(config)?.extract(&backend)
}

/// Extract a PDF file without blocking the async runtime.
#[cfg(feature = "async")]
pub async fn extract_file_async<P: AsRef<Path>>(path: P, config: PipelineConfig) -> Result<Extraction> {
    let data = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || extract_bytes(&data, config))
        .await
        .map_err(|e| Error::Other(format!("extraction task failed: {}", e)))?
}

/// Serialize an extraction as a standalone HTML document.
pub fn render_html(extraction: &Extraction, options: &HtmlOptions) -> String {
    render::to_html(&extraction.markup_pages(), &extraction.metadata, options)
}

/// Serialize an extraction as JSON.
pub fn render_json(extraction: &Extraction, format: JsonFormat) -> Result<String> {
    render::to_json(extraction, format)
}

/// Rebuild a PDF from HTML.
///
/// `original` holds the bytes of the source PDF, used for the verbatim-copy
/// fallback. Relative image paths resolve against `base_dir`.
pub fn rebuild_html(
    html: &str,
    base_dir: Option<&Path>,
    original: Option<&[u8]>,
    config: PipelineConfig,
) -> Result<Reconstruction> {
    let original = original.map(LopdfBackend::load_bytes).transpose()?;
    DocumentAssembler::new(config)?.reconstruct_html(
        html,
        base_dir.map(Path::to_path_buf),
        original.as_ref(),
    )
}

/// Rebuild a PDF from an HTML file, optionally backed by the original PDF.
pub fn rebuild_file<P: AsRef<Path>, Q: AsRef<Path>>(
    html_path: P,
    original: Option<Q>,
    config: PipelineConfig,
) -> Result<Reconstruction> {
    let html_path = html_path.as_ref();
    let html = std::fs::read_to_string(html_path)?;
    let original = original
        .map(|p| LopdfBackend::load_file(p).and_then(open_pdf))
        .transpose()?;
    DocumentAssembler::new(config)?.reconstruct_html(
        &html,
        html_path.parent().map(Path::to_path_buf),
        original.as_ref(),
    )
}

/// Builder for extracting PDF documents into markup.
///
/// # Example
///
/// ```no_run
/// use pagemark::Pagemark;
///
/// let html = Pagemark::new()
///     .with_background()
///     .with_asset_dir("./assets")
///     .parse("document.pdf")?
///     .to_html();
/// # Ok::<(), pagemark::Error>(())
/// ```
pub struct Pagemark {
    config: PipelineConfig,
    html_options: HtmlOptions,
}

impl Pagemark {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            html_options: HtmlOptions::default(),
        }
    }

    /// Replace the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.config = self.config.sequential();
        self
    }

    /// Render a text-free background layer under each page.
    pub fn with_background(mut self) -> Self {
        self.config = self.config.with_background(true);
        self
    }

    /// Write images into a directory instead of inlining them.
    pub fn with_asset_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config = self.config.with_asset_dir(dir);
        self
    }

    /// Set page selection.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.config = self.config.with_pages(pages);
        self
    }

    /// Set the HTML document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.html_options = self.html_options.with_title(title);
        self
    }

    /// Extract a PDF file.
    pub fn parse<P: AsRef<Path>>(self, path: P) -> Result<PagemarkResult> {
        let extraction = extract_file_with_config(path, self.config)?;
        Ok(PagemarkResult {
            extraction,
            html_options: self.html_options,
        })
    }

    /// Extract a PDF from bytes.
    pub fn parse_bytes(self, data: &[u8]) -> Result<PagemarkResult> {
        let extraction = extract_bytes(data, self.config)?;
        Ok(PagemarkResult {
            extraction,
            html_options: self.html_options,
        })
    }
}

impl Default for Pagemark {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of extracting a PDF document.
pub struct PagemarkResult {
    /// The extraction
    pub extraction: Extraction,
    html_options: HtmlOptions,
}

impl PagemarkResult {
    /// Convert to HTML.
    pub fn to_html(&self) -> String {
        render_html(&self.extraction, &self.html_options)
    }

    /// Convert to JSON.
    pub fn to_json(&self, format: JsonFormat) -> Result<String> {
        render_json(&self.extraction, format)
    }

    /// Recovered failures of the extraction.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.extraction.diagnostics
    }
}
