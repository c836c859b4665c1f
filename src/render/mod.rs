//! Markup emission and output formats.

pub mod assets;
mod emitter;
pub mod fonts;
mod html;
mod json;

pub use assets::AssetStore;
pub use emitter::MarkupEmitter;
pub use html::{escape, to_html, HtmlOptions, BACKGROUND_KIND, PAGE_BREAK_MARKER_CLASS, PAGE_CONTAINER_CLASS};
pub use json::{to_json, JsonFormat};
