//! RFC 5322 header block handling: splitting, unfolding, message-id tokens and
//! tolerant date parsing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

/// Split a message into its header block and body.
///
/// The blank line separating them belongs to neither part. Without a blank
/// line the whole input is headers.
pub fn split_header_block(data: &[u8]) -> (&[u8], &[u8]) {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return (&data[..i + 1], &data[i + 2..]);
        }
        if i + 3 < data.len() && &data[i..i + 4] == b"\r\n\r\n" {
            return (&data[..i + 2], &data[i + 4..]);
        }
    }
    (data, &[])
}

/// Decode text bytes: UTF-8 when valid, Windows-1252 otherwise (which accepts every byte).
pub fn decode_text_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold a header block into `(name, raw_value)` pairs, in source order.
///
/// Header names keep their original spelling so that they can be written back
/// unchanged; continuation lines are joined with a single space. Lines that are
/// neither a header nor a continuation (such as an mbox `From ` line) are skipped.
pub fn parse_raw_headers(block: &[u8]) -> Vec<(String, String)> {
    let text = decode_text_bytes(block);
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim();
            if name.is_empty() || name.contains(' ') {
                continue;
            }
            result.push((name.to_string(), line[colon_pos + 1..].trim().to_string()));
        }
    }

    result
}

/// First value of a header (case-insensitive name match).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Extract the first `<…>` token (Message-ID, In-Reply-To). Text without
/// brackets is returned trimmed.
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Extract every `<…>` token (References).
pub fn extract_all_angle_brackets(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = s;
    while let Some(start) = remaining.find('<') {
        match remaining[start..].find('>') {
            Some(end) => {
                result.push(remaining[start..start + end + 1].to_string());
                remaining = &remaining[start + end + 1..];
            }
            None => break,
        }
    }
    result
}

/// Parse a date header value in the many shapes found in real archives.
///
/// Tries RFC 2822, RFC 3339, then a list of broken-but-common layouts, named
/// time zones and IMAP-style `16-JUL-2025` dates. Returns `None` when nothing fits.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = strip_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);
    let normalized = normalize_imap_date(&no_dow);

    const FORMATS: [&str; 10] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for candidate in [&no_dow, &normalized] {
        let with_offset = replace_named_tz(candidate);
        for fmt in &FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&with_offset, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(&with_offset, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    debug!(date = trimmed, "No date layout matched");
    None
}

/// Drop a trailing RFC 5322 comment such as `(PST)`.
fn strip_comment(s: &str) -> &str {
    match s.find('(') {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    if !s.contains('-') {
        return s.to_string();
    }
    let lower = s.to_lowercase();
    for month in MONTHS {
        let pattern = format!("-{}-", month.to_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }
    s.to_string()
}

fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace a trailing well-known zone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
