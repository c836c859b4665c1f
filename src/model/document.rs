//! Document-level types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geometry of one page.
///
/// Immutable for the duration of an extraction pass; addressed by its
/// 1-based number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page number (1-indexed)
    pub number: u32,

    /// Width in native units (points)
    pub width: f32,

    /// Height in native units (points)
    pub height: f32,

    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
}

impl PageInfo {
    /// Create a new page description.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            rotation: 0,
        }
    }

    /// A4 portrait (595 x 842 points).
    pub fn a4(number: u32) -> Self {
        Self::new(number, 595.0, 842.0)
    }

    /// Whether the page is in landscape orientation.
    pub fn is_landscape(&self) -> bool {
        let (w, h) = if self.rotation == 90 || self.rotation == 270 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        w > h
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Keywords
    pub keywords: Option<String>,

    /// Creator application
    pub creator: Option<String>,

    /// PDF producer
    pub producer: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,

    /// PDF version (e.g., "1.7")
    pub pdf_version: String,

    /// Total number of pages
    pub page_count: u32,
}

impl Metadata {
    /// Create new metadata with PDF version.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            pdf_version: version.into(),
            ..Default::default()
        }
    }

    /// Named text fields that are present, in a stable order.
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
            ("keywords", &self.keywords),
            ("creator", &self.creator),
            ("producer", &self.producer),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    /// Set a text field by name. Unknown names are ignored.
    pub fn set_text_field(&mut self, name: &str, value: impl Into<String>) {
        let slot = match name {
            "title" => &mut self.title,
            "author" => &mut self.author,
            "subject" => &mut self.subject,
            "keywords" => &mut self.keywords,
            "creator" => &mut self.creator,
            "producer" => &mut self.producer,
            _ => return,
        };
        *slot = Some(value.into());
    }
}
