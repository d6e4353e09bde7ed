//! Plain-text extraction from payloads, stored as `TextContent`.

use crate::parser::header::decode_text_bytes;
use crate::parser::mime::{html_to_text, parse_message};
use crate::parser::rtf::{self, Encapsulated};

use super::essence;

/// Extracts searchable plain text from a payload of a given media type.
pub trait TextExtractor: Send + Sync {
    /// `None` when the media type is not supported or yields no text.
    fn extract_text(&self, media_type: &str, content: &[u8]) -> Option<String>;
}

/// Built-in extractor for text, HTML, RTF and RFC 822 messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, media_type: &str, content: &[u8]) -> Option<String> {
        let text = match essence(media_type).as_str() {
            "text/plain" => decode_text_bytes(content),
            "text/html" => html_to_text(&decode_text_bytes(content)),
            "text/rtf" | "application/rtf" => {
                let rtf_source = decode_text_bytes(content);
                match rtf::de_encapsulate(&rtf_source) {
                    Some(Encapsulated::Html(html)) => html_to_text(&html),
                    Some(Encapsulated::Text(text)) => text,
                    None => rtf::rtf_to_text(&rtf_source),
                }
            }
            "message/rfc822" => message_text(content),
            _ => return None,
        };
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

/// Header summary followed by the readable body of a message.
fn message_text(content: &[u8]) -> String {
    let msg = parse_message(content);
    let mut out = String::new();
    if let Some(from) = &msg.from {
        out.push_str(&format!("From: {from}\n"));
    }
    if !msg.to.is_empty() {
        let to: Vec<String> = msg.to.iter().map(ToString::to_string).collect();
        out.push_str(&format!("To: {}\n", to.join(", ")));
    }
    if let Some(subject) = &msg.subject {
        out.push_str(&format!("Subject: {subject}\n"));
    }
    if let Ok(Some(date)) = &msg.sent_date {
        out.push_str(&format!("Date: {}\n", date.to_rfc2822()));
    }
    out.push('\n');
    if let Some(text) = msg.bodies.text() {
        out.push_str(text);
    } else if let Some(html) = msg.bodies.html() {
        out.push_str(&html_to_text(html));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_html() {
        let x = PlainTextExtractor;
        assert_eq!(
            x.extract_text("text/plain; charset=utf-8", b"hello").as_deref(),
            Some("hello")
        );
        assert_eq!(
            x.extract_text("text/html", b"<p>Hi</p><p>there</p>").as_deref(),
            Some("Hi\nthere")
        );
    }

    #[test]
    fn test_rtf_variants() {
        let x = PlainTextExtractor;
        let plain = br"{\rtf1\ansi Hello\par}";
        assert_eq!(x.extract_text("application/rtf", plain).as_deref(), Some("Hello"));
        let wrapped = br"{\rtf1\ansi\fromhtml1 {\*\htmltag1 <p>}\htmlrtf x\htmlrtf0 Hi{\*\htmltag2 </p>}}";
        assert_eq!(x.extract_text("text/rtf", wrapped).as_deref(), Some("Hi"));
    }

    #[test]
    fn test_message_summary() {
        let x = PlainTextExtractor;
        let text = x
            .extract_text(
                "message/rfc822",
                b"From: Ana <ana@example.org>\nSubject: Lunch\n\nSee you at noon\n",
            )
            .unwrap();
        assert!(text.contains("From: Ana <ana@example.org>"));
        assert!(text.contains("Subject: Lunch"));
        assert!(text.contains("See you at noon"));
    }

    #[test]
    fn test_unsupported_and_empty() {
        let x = PlainTextExtractor;
        assert_eq!(x.extract_text("image/png", b"\x89PNG"), None);
        assert_eq!(x.extract_text("text/plain", b"   \n"), None);
    }
}
