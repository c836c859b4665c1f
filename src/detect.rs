//! Input sniffing: a PDF to extract or a markup document to rebuild.
//!
//! Only the first kilobyte is inspected. PDF readers accept a header that
//! is preceded by junk, so the `%PDF-` marker may sit anywhere in that
//! window. Markup is recognized by its first non-blank byte being `<`
//! followed somewhere by a known HTML tag.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Bytes inspected at the head of an input.
const SNIFF_LEN: usize = 1024;

const PDF_HEADER: &[u8] = b"%PDF-";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Lowercase tags that mark a document as HTML.
const MARKUP_TAGS: &[&[u8]] = &[b"<!doctype html", b"<html", b"<head", b"<body", b"<div"];

/// Header facts of a PDF input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// `major.minor` from the header
    pub version: String,
    /// A linearization dictionary appears in the first kilobyte
    pub linearized: bool,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)?;
        if self.linearized {
            write!(f, " (linearized)")?;
        }
        Ok(())
    }
}

/// Direction a file goes through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Extract into markup
    Pdf(PdfFormat),
    /// Rebuild into a PDF
    Markup,
}

/// Sniff a file on disk.
pub fn detect_from_path<P: AsRef<Path>>(path: P) -> Result<InputKind> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    detect_from_bytes(&head)
}

/// Sniff the leading bytes of an input.
///
/// Fails with [`Error::UnknownFormat`] when the bytes are neither, and with
/// [`Error::UnsupportedVersion`] when a PDF header carries a malformed version.
pub fn detect_from_bytes(data: &[u8]) -> Result<InputKind> {
    let head = &data[..data.len().min(SNIFF_LEN)];
    if let Some(format) = pdf_header(head)? {
        return Ok(InputKind::Pdf(format));
    }
    if looks_like_markup(head) {
        return Ok(InputKind::Markup);
    }
    Err(Error::UnknownFormat)
}

/// Whether a file starts like a PDF.
pub fn is_pdf<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_from_path(path), Ok(InputKind::Pdf(_)))
}

fn pdf_header(head: &[u8]) -> Result<Option<PdfFormat>> {
    let Some(at) = position(head, PDF_HEADER) else {
        return Ok(None);
    };
    let rest = &head[at + PDF_HEADER.len()..];
    let Some(raw) = rest.get(..3) else {
        // A truncated header is not enough to call it a PDF.
        return Ok(None);
    };

    match raw {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok(Some(PdfFormat {
                version: format!("{}.{}", *major as char, *minor as char),
                linearized: position(head, b"/Linearized").is_some(),
            }))
        }
        _ => Err(Error::UnsupportedVersion(
            String::from_utf8_lossy(raw).into_owned(),
        )),
    }
}

fn looks_like_markup(head: &[u8]) -> bool {
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    let starts_with_tag = head
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<');
    if !starts_with_tag {
        return false;
    }
    let lower = head.to_ascii_lowercase();
    MARKUP_TAGS.iter().any(|tag| position(&lower, tag).is_some())
}

fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(data: &[u8]) -> PdfFormat {
        match detect_from_bytes(data).unwrap() {
            InputKind::Pdf(format) => format,
            InputKind::Markup => panic!("detected markup"),
        }
    }

    #[test]
    fn test_pdf_versions() {
        assert_eq!(pdf(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3").version, "1.7");
        assert_eq!(pdf(b"%PDF-2.0\n").version, "2.0");
        assert!(!pdf(b"%PDF-1.7\n").linearized);
    }

    #[test]
    fn test_header_after_junk() {
        let format = pdf(b"\x00\x00junk%PDF-1.4\n1 0 obj << /Linearized 1 >>");
        assert_eq!(format.version, "1.4");
        assert!(format.linearized);
        assert_eq!(format.to_string(), "PDF 1.4 (linearized)");
    }

    #[test]
    fn test_header_past_window_is_ignored() {
        let mut data = vec![b' '; SNIFF_LEN];
        data.extend_from_slice(b"%PDF-1.4\n");
        assert!(matches!(detect_from_bytes(&data), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_markup() {
        assert_eq!(
            detect_from_bytes(b"\xEF\xBB\xBF  <!DOCTYPE html><html></html>").unwrap(),
            InputKind::Markup
        );
        assert_eq!(
            detect_from_bytes(b"<div class=\"pdf-page-container\"></div>").unwrap(),
            InputKind::Markup
        );
        // A tag, but not one that makes it HTML
        assert!(matches!(detect_from_bytes(b"<?xml version=\"1.0\"?><svg/>"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_unknown_and_truncated() {
        assert!(matches!(detect_from_bytes(b"plain text"), Err(Error::UnknownFormat)));
        assert!(matches!(detect_from_bytes(b""), Err(Error::UnknownFormat)));
        assert!(matches!(detect_from_bytes(b"%PDF-1"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_malformed_version() {
        assert!(matches!(
            detect_from_bytes(b"%PDF-x.y\n"),
            Err(Error::UnsupportedVersion(v)) if v == "x.y"
        ));
        assert!(matches!(
            detect_from_bytes(b"%PDF-10.0"),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_detect_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("page.html");
        std::fs::write(&html, "<html><body></body></html>").unwrap();
        assert_eq!(detect_from_path(&html).unwrap(), InputKind::Markup);
        assert!(!is_pdf(&html));

        let doc = dir.path().join("doc.pdf");
        std::fs::write(&doc, b"%PDF-1.5\n%%EOF\n").unwrap();
        assert!(is_pdf(&doc));
    }
}
