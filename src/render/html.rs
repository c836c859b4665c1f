//! Standalone HTML output.
//!
//! Each page becomes a `div.pdf-page-container` sized in pixels, holding
//! absolutely positioned children. Every child carries `data-kind` so the
//! markup reader can rebuild it.

use crate::model::{
    ImageSource, MarkupElement, MarkupPage, MarkupPayload, MarkupTable, Metadata, ShapeStyle,
    TextStyle,
};

/// Class of a page container.
pub const PAGE_CONTAINER_CLASS: &str = "pdf-page-container";
/// Class of the editor-only marker between pages.
pub const PAGE_BREAK_MARKER_CLASS: &str = "pdf-page-break-marker";
/// `data-kind` of the background layer.
pub const BACKGROUND_KIND: &str = "background";

const STYLESHEET: &str = "\
body { margin: 0; padding: 16px 0; background: #e5e5e5; }
.pdf-page-container { position: relative; margin: 0 auto 16px; background: #ffffff; overflow: hidden; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.3); }
.pdf-page-container * { box-sizing: border-box; }
.pdf-text { margin: 0; padding: 0; white-space: pre; line-height: 1; overflow: visible; }
.pdf-table { border-collapse: collapse; table-layout: fixed; }
.pdf-table td, .pdf-table th { padding: 0; font-weight: inherit; text-align: left; vertical-align: top; white-space: pre; }
.pdf-page-break-marker { height: 0; border-top: 1px dashed #999999; margin: 0 auto 16px; }
@media print { .no-print { display: none; } body { background: none; padding: 0; } .pdf-page-container { margin: 0; box-shadow: none; page-break-after: always; } }
";

/// HTML output options.
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    /// Document title; falls back to the metadata title
    pub title: Option<String>,
    /// Mark text elements `contenteditable`
    pub editable: bool,
    /// Emit editor-only markers between pages
    pub page_markers: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            title: None,
            editable: true,
            page_markers: false,
        }
    }
}

impl HtmlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_page_markers(mut self, markers: bool) -> Self {
        self.page_markers = markers;
        self
    }
}

/// Render pages and metadata as an HTML document.
pub fn to_html(pages: &[MarkupPage], metadata: &Metadata, options: &HtmlOptions) -> String {
    let mut out = String::with_capacity(4096 + pages.len() * 8192);

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta charset=\"utf-8\">\n");
    push_meta(&mut out, "generator", concat!("pagemark ", env!("CARGO_PKG_VERSION")));
    if let Some(first) = pages.first() {
        push_meta(&mut out, "page-width", &format!("{:.2}", first.width_native));
        push_meta(&mut out, "page-height", &format!("{:.2}", first.height_native));
    }
    for (name, value) in metadata.text_fields() {
        push_meta(&mut out, name, value);
    }
    if !metadata.pdf_version.is_empty() {
        push_meta(&mut out, "pdf-version", &metadata.pdf_version);
    }
    if let Some(created) = metadata.created {
        push_meta(&mut out, "created", &created.to_rfc3339());
    }
    if let Some(modified) = metadata.modified {
        push_meta(&mut out, "modified", &modified.to_rfc3339());
    }

    let title = options
        .title
        .as_deref()
        .or(metadata.title.as_deref())
        .unwrap_or("Document");
    out.push_str(&format!("<title>{}</title>\n", escape(title)));
    out.push_str("<style>\n");
    out.push_str(STYLESHEET);
    out.push_str("</style>\n</head>\n<body>\n");

    for (i, page) in pages.iter().enumerate() {
        if options.page_markers && i > 0 {
            out.push_str(&format!(
                "<div class=\"{} no-print\" data-page-break=\"{}\"></div>\n",
                PAGE_BREAK_MARKER_CLASS, page.number
            ));
        }
        render_page(&mut out, page, options);
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn push_meta(out: &mut String, name: &str, content: &str) {
    out.push_str(&format!(
        "<meta name=\"{}\" content=\"{}\">\n",
        escape(name),
        escape(content)
    ));
}

fn render_page(out: &mut String, page: &MarkupPage, options: &HtmlOptions) {
    let rotation = if page.rotation != 0 {
        format!(" data-page-rotation=\"{}\"", page.rotation)
    } else {
        String::new()
    };
    out.push_str(&format!(
        "<div class=\"{}\" id=\"pdf-page-{}\" data-page-number=\"{}\" data-page-width=\"{:.2}\" data-page-height=\"{:.2}\"{} style=\"position: relative; width: {:.2}px; height: {:.2}px;\">\n",
        PAGE_CONTAINER_CLASS,
        page.number,
        page.number,
        page.width_native,
        page.height_native,
        rotation,
        page.width_px,
        page.height_px,
    ));

    if let Some(background) = &page.background {
        if let Some(src) = background.source.to_src() {
            out.push_str(&format!(
                "<img class=\"pdf-background\" data-kind=\"{}\" src=\"{}\" alt=\"\" style=\"position: absolute; left: 0px; top: 0px; width: {:.2}px; height: {:.2}px; z-index: 0;\">\n",
                BACKGROUND_KIND,
                escape(&src),
                page.width_px,
                page.height_px,
            ));
        }
    }

    for element in &page.elements {
        render_element(out, element, options);
    }

    out.push_str("</div>\n");
}

fn position_style(element: &MarkupElement) -> String {
    let mut style = String::from("position: absolute;");
    let fields = [
        ("left", element.left),
        ("top", element.top),
        ("width", element.width),
        ("height", element.height),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            style.push_str(&format!(" {}: {};", name, value));
        }
    }
    style.push_str(&format!(" z-index: {};", element.z_index));
    style
}

fn text_style(style: &TextStyle) -> String {
    let mut css = format!(
        " font-family: {}; font-size: {:.2}px; color: {};",
        style.font_family, style.font_size, style.color
    );
    if style.bold {
        css.push_str(" font-weight: bold;");
    }
    if style.italic {
        css.push_str(" font-style: italic;");
    }
    let decorations: Vec<&str> = [
        (style.underline, "underline"),
        (style.strikethrough, "line-through"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if !decorations.is_empty() {
        css.push_str(&format!(" text-decoration: {};", decorations.join(" ")));
    }
    if style.superscript {
        css.push_str(" vertical-align: super;");
    } else if style.subscript {
        css.push_str(" vertical-align: sub;");
    }
    css
}

fn shape_style(style: &ShapeStyle, border_property: &str) -> String {
    let mut css = String::new();
    if let Some(stroke) = &style.stroke {
        css.push_str(&format!(
            " {}: {:.2}px solid {};",
            border_property, style.stroke_width, stroke
        ));
    }
    if let Some(fill) = &style.fill {
        css.push_str(&format!(" background-color: {};", fill));
    }
    if style.opacity < 1.0 {
        css.push_str(&format!(" opacity: {:.2};", style.opacity));
    }
    css
}

fn render_element(out: &mut String, element: &MarkupElement, options: &HtmlOptions) {
    let kind = element.kind.as_str();
    let position = position_style(element);

    match &element.payload {
        MarkupPayload::Text { content, style } => {
            let editable = if options.editable {
                " contenteditable=\"true\""
            } else {
                ""
            };
            out.push_str(&format!(
                "<div class=\"pdf-element pdf-text\" data-kind=\"{}\"{} style=\"{}{}\">{}</div>\n",
                kind,
                editable,
                position,
                escape(&text_style(style)),
                escape(content),
            ));
        }
        MarkupPayload::Image { source } => {
            let src = match (source.to_src(), source) {
                (Some(src), _) => format!(" src=\"{}\"", escape(&src)),
                (None, ImageSource::Unresolved { image_ref }) => {
                    format!(" data-image-ref=\"{}\"", escape(&image_ref.0))
                }
                (None, _) => String::new(),
            };
            out.push_str(&format!(
                "<img class=\"pdf-element pdf-image\" data-kind=\"{}\"{} alt=\"\" style=\"{}\">\n",
                kind, src, position,
            ));
        }
        MarkupPayload::Vector { style, path } => {
            let path_attr = path
                .as_deref()
                .map(|p| format!(" data-path=\"{}\"", escape(p)))
                .unwrap_or_default();
            out.push_str(&format!(
                "<div class=\"pdf-element pdf-vector\" data-kind=\"{}\"{} style=\"{}{}\"></div>\n",
                kind,
                path_attr,
                position,
                escape(&shape_style(style, "border")),
            ));
        }
        MarkupPayload::Line { style } => {
            out.push_str(&format!(
                "<div class=\"pdf-element pdf-line\" data-kind=\"{}\" style=\"{}{}\"></div>\n",
                kind,
                position,
                escape(&shape_style(style, "border-top")),
            ));
        }
        MarkupPayload::Table(table) => render_table(out, kind, &position, table),
    }
}

fn render_table(out: &mut String, kind: &str, position: &str, table: &MarkupTable) {
    out.push_str(&format!(
        "<table class=\"pdf-element pdf-table\" data-kind=\"{}\" style=\"{}{}\">\n",
        kind,
        position,
        escape(&text_style(&table.style)),
    ));

    for (r, row) in table.rows.iter().enumerate() {
        let header = table.has_header && r == 0;
        if header {
            out.push_str("<thead>\n");
        } else if r == usize::from(table.has_header) {
            out.push_str("<tbody>\n");
        }

        let tag = if header { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row {
            let mut anchor = String::new();
            if let (Some(left), Some(top)) = (cell.left, cell.top) {
                anchor = format!(" data-left=\"{:.2}\" data-top=\"{:.2}\"", left, top);
            }
            if let Some(size) = cell.font_size {
                anchor.push_str(&format!(
                    " data-font-size=\"{:.2}\" style=\"font-size: {:.2}px\"",
                    size, size
                ));
            }
            out.push_str(&format!(
                "<{tag}{anchor}>{}</{tag}>",
                escape(&cell.text),
                tag = tag,
                anchor = anchor
            ));
        }
        out.push_str("</tr>\n");

        if header {
            out.push_str("</thead>\n");
        }
    }
    if table.rows.len() > usize::from(table.has_header) {
        out.push_str("</tbody>\n");
    }
    out.push_str("</table>\n");
}

/// Escape text for HTML content and double-quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackgroundLayer, ImageRef, MarkupCell, MarkupKind};

    fn page(elements: Vec<MarkupElement>) -> MarkupPage {
        MarkupPage {
            number: 1,
            width_px: 816.0,
            height_px: 1056.0,
            width_native: 612.0,
            height_native: 792.0,
            rotation: 0,
            elements,
            background: None,
        }
    }

    fn text_element(content: &str) -> MarkupElement {
        MarkupElement::positioned(
            MarkupKind::Text,
            96.0,
            100.0,
            200.0,
            19.2,
            MarkupPayload::Text {
                content: content.to_string(),
                style: TextStyle {
                    bold: true,
                    underline: true,
                    strikethrough: true,
                    ..TextStyle::default()
                },
            },
        )
        .with_z_index(3)
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_page_container_and_text() {
        let mut metadata = Metadata::with_version("1.7");
        metadata.title = Some("Report <draft>".into());
        let html = to_html(&[page(vec![text_element("Tom & Jerry")])], &metadata, &HtmlOptions::default());

        assert!(html.contains("class=\"pdf-page-container\""));
        assert!(html.contains("data-page-width=\"612.00\""));
        assert!(html.contains("width: 816.00px; height: 1056.00px;"));
        assert!(html.contains("<title>Report &lt;draft&gt;</title>"));
        assert!(html.contains("<meta name=\"pdf-version\" content=\"1.7\">"));
        assert!(html.contains("contenteditable=\"true\""));
        assert!(html.contains("left: 96.00px; top: 100.00px;"));
        assert!(html.contains("z-index: 3;"));
        assert!(html.contains("font-weight: bold;"));
        assert!(html.contains("text-decoration: underline line-through;"));
        assert!(html.contains(">Tom &amp; Jerry</div>"));
    }

    #[test]
    fn test_unresolved_image_keeps_reference() {
        let image = MarkupElement::positioned(
            MarkupKind::Image,
            0.0,
            0.0,
            10.0,
            10.0,
            MarkupPayload::Image {
                source: ImageSource::Unresolved {
                    image_ref: ImageRef("12 0".into()),
                },
            },
        );
        let html = to_html(&[page(vec![image])], &Metadata::default(), &HtmlOptions::default());
        assert!(html.contains("data-image-ref=\"12 0\""));
        assert!(!html.contains(" src="));
    }

    #[test]
    fn test_background_and_markers() {
        let mut first = page(vec![]);
        first.background = Some(BackgroundLayer {
            source: ImageSource::File {
                path: "assets/p1_background.png".into(),
            },
            raster_width: 1224,
            raster_height: 1584,
        });
        let mut second = page(vec![]);
        second.number = 2;
        let options = HtmlOptions::new().with_page_markers(true);
        let html = to_html(&[first, second], &Metadata::default(), &options);
        assert!(html.contains("data-kind=\"background\" src=\"assets/p1_background.png\""));
        assert!(html.contains("z-index: 0;"));
        assert_eq!(html.matches("pdf-page-break-marker no-print").count(), 1);
    }

    #[test]
    fn test_table_header_and_anchors() {
        let cell = |text: &str, left: Option<f32>| MarkupCell {
            text: text.to_string(),
            left,
            top: left.map(|_| 100.0),
            font_size: None,
        };
        let table = MarkupElement::positioned(
            MarkupKind::Table,
            10.0,
            100.0,
            200.0,
            40.0,
            MarkupPayload::Table(MarkupTable {
                rows: vec![
                    vec![cell("Name", Some(10.0)), cell("Qty", Some(120.0))],
                    vec![cell("Bolts", Some(10.0)), cell("", None)],
                ],
                has_header: true,
                style: TextStyle::default(),
            }),
        );
        let html = to_html(&[page(vec![table])], &Metadata::default(), &HtmlOptions::default());
        assert!(html.contains("<thead>\n<tr><th data-left=\"10.00\" data-top=\"100.00\">Name</th>"));
        assert!(html.contains("<tbody>\n<tr><td data-left=\"10.00\" data-top=\"100.00\">Bolts</td><td></td></tr>"));
    }
}
