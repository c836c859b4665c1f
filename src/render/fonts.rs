//! Embedded font name to web-safe family mapping.

/// Generic family a font falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericFamily {
    SansSerif,
    Serif,
    Monospace,
}

/// Family used when a font name is unknown.
pub const FALLBACK_FAMILY: &str = "sans-serif";

/// Normalized name prefix to CSS family list.
const FONT_TABLE: &[(&str, &str)] = &[
    ("arial", "Arial, Helvetica, sans-serif"),
    ("helvetica", "Helvetica, Arial, sans-serif"),
    ("liberationsans", "Arial, Helvetica, sans-serif"),
    ("nimbussans", "Helvetica, Arial, sans-serif"),
    ("dejavusans", "Verdana, Geneva, sans-serif"),
    ("verdana", "Verdana, Geneva, sans-serif"),
    ("tahoma", "Tahoma, Geneva, sans-serif"),
    ("trebuchet", "'Trebuchet MS', Helvetica, sans-serif"),
    ("calibri", "Calibri, Arial, sans-serif"),
    ("segoe", "'Segoe UI', Arial, sans-serif"),
    ("timesnewroman", "'Times New Roman', Times, serif"),
    ("times", "'Times New Roman', Times, serif"),
    ("liberationserif", "'Times New Roman', Times, serif"),
    ("nimbusroman", "'Times New Roman', Times, serif"),
    ("georgia", "Georgia, serif"),
    ("cambria", "Cambria, Georgia, serif"),
    ("garamond", "Garamond, Georgia, serif"),
    ("palatino", "'Palatino Linotype', Palatino, serif"),
    ("bookantiqua", "'Palatino Linotype', Palatino, serif"),
    ("couriernew", "'Courier New', Courier, monospace"),
    ("courier", "'Courier New', Courier, monospace"),
    ("liberationmono", "'Courier New', Courier, monospace"),
    ("nimbusmono", "'Courier New', Courier, monospace"),
    ("consolas", "Consolas, 'Courier New', monospace"),
    ("dejavusansmono", "'Courier New', Courier, monospace"),
];

const STYLE_SUFFIXES: &[&str] = &["psmt", "mt", "ps"];

/// Drop a subset tag such as `ABCDEF+`.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Reduce an embedded font name to a lowercase lookup key.
///
/// `ABCDEF+TimesNewRomanPS-BoldItalicMT` becomes `timesnewroman`.
pub fn normalize_font_name(name: &str) -> String {
    let name = strip_subset_prefix(name);
    let base = name.split(['-', ',']).next().unwrap_or(name);
    let mut key: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    for suffix in STYLE_SUFFIXES {
        if key.len() > suffix.len() && key.ends_with(suffix) {
            key.truncate(key.len() - suffix.len());
            break;
        }
    }
    key
}

/// Map an embedded font name to a web-safe CSS family list.
///
/// The longest matching table prefix wins, so `DejaVuSansMono` is not
/// mistaken for `DejaVuSans`. Unknown fonts become [`FALLBACK_FAMILY`].
pub fn web_safe_family(font_name: &str) -> &'static str {
    let key = normalize_font_name(font_name);
    FONT_TABLE
        .iter()
        .filter(|(prefix, _)| key.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, family)| *family)
        .unwrap_or(FALLBACK_FAMILY)
}

/// Generic family of a CSS family list.
pub fn generic_family(css_family: &str) -> GenericFamily {
    let lower = css_family.to_ascii_lowercase();
    if lower.contains("monospace") || lower.contains("courier") || lower.contains("mono") {
        GenericFamily::Monospace
    } else if lower.contains("sans-serif") {
        GenericFamily::SansSerif
    } else if lower.contains("serif") || lower.contains("times") || lower.contains("georgia") {
        GenericFamily::Serif
    } else {
        GenericFamily::SansSerif
    }
}
