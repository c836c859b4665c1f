//! JSON rendering for extraction results.

use serde::Serialize;

use crate::error::{Error, Result};

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

/// Convert any serializable result (usually an [`Extraction`](crate::Extraction)) to JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<String> {
    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(value),
        JsonFormat::Compact => serde_json::to_string(value),
    };

    result.map_err(|e| Error::Render(format!("JSON serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkupElement, MarkupKind, MarkupPage, MarkupPayload, TextStyle};

    fn page() -> MarkupPage {
        MarkupPage {
            number: 1,
            width_px: 816.0,
            height_px: 1056.0,
            width_native: 612.0,
            height_native: 792.0,
            rotation: 0,
            elements: vec![MarkupElement::positioned(
                MarkupKind::Text,
                1.0,
                2.0,
                3.0,
                4.0,
                MarkupPayload::Text {
                    content: "Hello".into(),
                    style: TextStyle::default(),
                },
            )],
            background: None,
        }
    }

    #[test]
    fn test_to_json_pretty() {
        let json = to_json(&page(), JsonFormat::Pretty).unwrap();
        assert!(json.contains("\"kind\": \"text\""));
        assert!(json.contains("Hello"));
        assert!(json.contains('\n')); // Pretty has newlines
    }

    #[test]
    fn test_to_json_compact() {
        let json = to_json(&[page()], JsonFormat::Compact).unwrap();
        assert!(!json.contains('\n')); // Compact has no newlines
        assert!(json.contains("\"unit\":\"px\""));
    }
}
