//! PDF parsing and page analysis.
//!
//! [`DocumentEngine`] is the seam to the underlying PDF library. Above it sit
//! the page analysis stages: classification, table detection and background
//! isolation.

mod backend;
mod background;
mod classifier;
mod content;
mod fonts;
pub mod images;
mod raster;
mod table_detector;

pub(crate) use backend::inherited_attribute;
pub use backend::{DocumentEngine, LopdfBackend};
pub use background::BackgroundIsolator;
pub use classifier::{ClassifierConfig, ElementClassifier};
pub use content::{ContentInterpreter, Matrix, DESCENT_RATIO};
pub use images::ImageData;
pub use raster::{rasterize, Raster};
pub use table_detector::{TableDetector, TableDetectorConfig};
