//! Magic-byte media type detection.

use crate::parser::header;
use crate::parser::mbox::is_mbox_separator;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const MBOX: &str = "application/mbox";
pub const RFC822: &str = "message/rfc822";

/// Detects the media type of raw content.
///
/// Implementations must be pure: the same bytes always give the same answer.
pub trait ContentSniffer: Send + Sync {
    fn sniff(&self, content: &[u8]) -> String;
}

/// Sniffer for the formats commonly found in mail.
///
/// Binary formats are recognized by `infer`; mail stores, messages and
/// markup, which `infer` does not know, by their leading lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

/// Outlook personal folders; unknown to `infer`.
const PST_MAGIC: &[u8] = b"!BDN";
const PST: &str = "application/vnd.ms-outlook-pst";

/// Header names that identify an RFC 5322 message.
const MESSAGE_HEADERS: [&str; 6] = [
    "from",
    "date",
    "subject",
    "message-id",
    "received",
    "mime-version",
];

/// Only the beginning of the content is inspected.
const SNIFF_WINDOW: usize = 8192;

impl ContentSniffer for MagicSniffer {
    fn sniff(&self, content: &[u8]) -> String {
        let head = &content[..content.len().min(SNIFF_WINDOW)];
        let head = head.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(head);

        if head.starts_with(PST_MAGIC) {
            return PST.to_string();
        }
        if looks_like_mbox(head) {
            return MBOX.to_string();
        }
        if let Some(kind) = infer::get(head) {
            return kind.mime_type().to_string();
        }
        if looks_like_html(head) {
            return "text/html".to_string();
        }
        if looks_like_message(head) {
            return RFC822.to_string();
        }
        if looks_like_text(head) {
            return "text/plain".to_string();
        }
        OCTET_STREAM.to_string()
    }
}

fn looks_like_html(head: &[u8]) -> bool {
    let start = head.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(head.len());
    let prefix: Vec<u8> = head[start..]
        .iter()
        .take(14)
        .map(u8::to_ascii_lowercase)
        .collect();
    prefix.starts_with(b"<!doctype html") || prefix.starts_with(b"<html")
}

/// A `From ` separator line followed by a header line.
fn looks_like_mbox(head: &[u8]) -> bool {
    if !is_mbox_separator(head) {
        return false;
    }
    let Some(eol) = head.iter().position(|&b| b == b'\n') else {
        return false;
    };
    let next_line = head[eol + 1..].split(|&b| b == b'\n').next().unwrap_or_default();
    is_header_line(next_line)
}

/// A leading header block naming at least two well-known message headers.
fn looks_like_message(head: &[u8]) -> bool {
    let first_line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    if !is_header_line(first_line) {
        return false;
    }
    let (block, _) = header::split_header_block(head);
    let headers = header::parse_raw_headers(block);
    let known = MESSAGE_HEADERS
        .iter()
        .filter(|name| header::get_header(&headers, name).is_some())
        .count();
    known >= 2
}

fn is_header_line(line: &[u8]) -> bool {
    match line.iter().position(|&b| b == b':') {
        Some(colon) if colon > 0 => line[..colon]
            .iter()
            .all(|&b| b.is_ascii_graphic() && b != b':'),
        _ => false,
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() {
        return false;
    }
    // A multi-byte sequence may be cut at the window edge.
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && head.len() == SNIFF_WINDOW,
    };
    valid
        && !head
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C))
}
