//! Error types and recoverable diagnostics for pagemark.

use std::fmt;
use std::io;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type alias for pagemark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while extracting or rebuilding documents.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is neither a PDF nor markup.
    #[error("Unknown file format: neither a PDF nor HTML markup")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Invalid geometric input (negative dimension, non-finite value).
    #[error("Unit conversion error: {0}")]
    UnitConversion(String),

    /// A single primitive could not be categorized.
    #[error("Classification error: {0}")]
    Classification(String),

    /// Page-level failure while reading primitives.
    #[error("Extraction error on page {page}: {message}")]
    Extraction { page: u32, message: String },

    /// Page-level failure while building placement commands.
    #[error("Reconstruction error on page {page}: {message}")]
    Reconstruction { page: u32, message: String },

    /// Document-level failure with no fallback available.
    #[error("Assembly error: {0}")]
    Assembly(String),

    /// Malformed or unsupported markup.
    #[error("Markup error: {0}")]
    Markup(String),

    /// Error decoding or encoding image data.
    #[error("Image error: {0}")]
    Image(String),

    /// Error during serialization (HTML, JSON).
    #[error("Rendering error: {0}")]
    Render(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an extraction error for a page.
    pub fn extraction(page: u32, message: impl Into<String>) -> Self {
        Error::Extraction {
            page,
            message: message.into(),
        }
    }

    /// Build a reconstruction error for a page.
    pub fn reconstruction(page: u32, message: impl Into<String>) -> Self {
        Error::Reconstruction {
            page,
            message: message.into(),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// How bad a recovered failure was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A single element was skipped.
    Element,
    /// A whole page (or a page-level stage such as table detection) was skipped.
    Page,
    /// The document result is degraded (fallback used).
    Document,
}

/// A failure that was recovered locally and reported next to the result.
#[derive(Debug, Serialize)]
pub struct Diagnostic {
    /// Page the failure belongs to, if any.
    pub page: Option<u32>,
    /// Index of the primitive or markup element on that page, if any.
    pub element: Option<usize>,
    /// Scope of the failure.
    pub severity: Severity,
    /// The underlying error.
    #[serde(serialize_with = "serialize_error")]
    pub error: Error,
}

fn serialize_error<S: Serializer>(error: &Error, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.page, self.element) {
            (Some(page), Some(element)) => {
                write!(f, "page {} element {}: {}", page, element, self.error)
            }
            (Some(page), None) => write!(f, "page {}: {}", page, self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// Accumulated recovered failures of one extraction or reconstruction call.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an element-level failure.
    pub fn element(&mut self, page: u32, element: usize, error: Error) {
        log::warn!("page {} element {}: {}", page, element, error);
        self.entries.push(Diagnostic {
            page: Some(page),
            element: Some(element),
            severity: Severity::Element,
            error,
        });
    }

    /// Record a page-level failure.
    pub fn page(&mut self, page: u32, error: Error) {
        log::warn!("page {}: {}", page, error);
        self.entries.push(Diagnostic {
            page: Some(page),
            element: None,
            severity: Severity::Page,
            error,
        });
    }

    /// Record a document-level degradation.
    pub fn document(&mut self, error: Error) {
        log::warn!("{}", error);
        self.entries.push(Diagnostic {
            page: None,
            element: None,
            severity: Severity::Document,
            error,
        });
    }

    /// Append another list, keeping order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the recorded failures.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Failures recorded for a given page.
    pub fn for_page(&self, page: u32) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.page == Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Encrypted;
        assert_eq!(err.to_string(), "Document is encrypted");

        let err = Error::extraction(5, "boom");
        assert_eq!(err.to_string(), "Extraction error on page 5: boom");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_diagnostics_accumulate() {
        let mut diags = Diagnostics::new();
        diags.page(5, Error::extraction(5, "engine failed"));
        diags.element(2, 3, Error::Classification("bad box".into()));

        assert_eq!(diags.len(), 2);
        assert_eq!(diags.for_page(5).count(), 1);
        let first = diags.iter().next().unwrap();
        assert_eq!(first.severity, Severity::Page);
        assert_eq!(first.to_string(), "page 5: Extraction error on page 5: engine failed");
    }

    #[test]
    fn test_diagnostics_serialize_as_list() {
        let mut diags = Diagnostics::new();
        diags.document(Error::Assembly("fallback".into()));
        let json = serde_json::to_string(&diags).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("Assembly error: fallback"));
    }
}
