//! Reading edited markup.

mod reader;
mod style;
mod tree;

pub use reader::{MarkupDocument, MarkupReader, CLEANUP_SELECTORS};
pub use style::{InlineStyle, StyleParser};
pub use tree::{HtmlTree, MarkupNode, MarkupTree};
