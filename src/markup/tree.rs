//! Tag-tree access for edited markup.
//!
//! The reader only needs CSS selection, attribute and text access, node
//! removal and `<meta>` lookup. [`MarkupTree`] captures exactly that, and
//! [`HtmlTree`] implements it on top of `scraper`.

use std::path::Path;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};

/// One element of a markup tree.
pub trait MarkupNode: Clone {
    /// Lowercase tag name.
    fn tag(&self) -> &str;

    /// Attribute value.
    fn attr(&self, name: &str) -> Option<&str>;

    /// Whether the element carries `class`.
    fn has_class(&self, class: &str) -> bool;

    /// Concatenated text of all descendants.
    fn text(&self) -> String;

    /// Descendants matching a CSS selector, in document order.
    fn select_within(&self, selector: &str) -> Result<Vec<Self>>;

    /// Whether `ancestor` is a proper ancestor of this element.
    fn is_inside(&self, ancestor: &Self) -> bool;
}

/// Query and mutation over a parsed markup document.
pub trait MarkupTree {
    type Node<'a>: MarkupNode
    where
        Self: 'a;

    /// Elements matching a CSS selector, in document order.
    fn select(&self, selector: &str) -> Result<Vec<Self::Node<'_>>>;

    /// Remove every element matching `selector`. Returns how many were removed.
    fn remove(&mut self, selector: &str) -> Result<usize>;

    /// Content of `<meta name="...">`.
    fn meta(&self, name: &str) -> Option<String>;

    /// The `<body>` element.
    fn body(&self) -> Option<Self::Node<'_>>;
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::Markup(format!("invalid selector '{}': {:?}", selector, e)))
}

/// HTML document parsed with `scraper`.
pub struct HtmlTree {
    html: Html,
}

impl HtmlTree {
    /// Parse an HTML document. Parsing is lenient and never fails.
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Read and parse an HTML file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::parse(&source))
    }
}

impl MarkupNode for ElementRef<'_> {
    fn tag(&self) -> &str {
        self.value().name()
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn has_class(&self, class: &str) -> bool {
        self.value().classes().any(|c| c == class)
    }

    fn text(&self) -> String {
        ElementRef::text(self).collect()
    }

    fn select_within(&self, selector: &str) -> Result<Vec<Self>> {
        let selector = parse_selector(selector)?;
        Ok(self.select(&selector).collect())
    }

    fn is_inside(&self, ancestor: &Self) -> bool {
        self.ancestors().any(|node| node.id() == ancestor.id())
    }
}

impl MarkupTree for HtmlTree {
    type Node<'a> = ElementRef<'a>;

    fn select(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).collect())
    }

    fn remove(&mut self, selector: &str) -> Result<usize> {
        let selector = parse_selector(selector)?;
        let ids: Vec<_> = self.html.select(&selector).map(|e| e.id()).collect();
        let mut removed = 0;
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn meta(&self, name: &str) -> Option<String> {
        let selector = parse_selector("meta[name]").ok()?;
        self.html
            .select(&selector)
            .find(|m| m.value().attr("name") == Some(name))
            .and_then(|m| m.value().attr("content"))
            .map(str::to_string)
    }

    fn body(&self) -> Option<ElementRef<'_>> {
        let selector = parse_selector("body").ok()?;
        self.html.select(&selector).next()
    }
}
