//! Content services consumed by the extraction engine: media-type sniffing
//! and plain-text extraction for payload indexing.

pub mod sniff;
pub mod text;

pub use sniff::{ContentSniffer, MagicSniffer};
pub use text::{PlainTextExtractor, TextExtractor};

/// Lowercased media type without parameters (`"Text/HTML; charset=x"` → `"text/html"`).
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_essence() {
        assert_eq!(essence("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(essence(" application/pdf "), "application/pdf");
        assert_eq!(essence(""), "");
    }
}
