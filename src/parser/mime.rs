//! MIME message parsing: normalized fields, body variants and attachments
//! from a byte-exact RFC 5322 message, plus HTML-to-text conversion.

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::ParseWarning;
use crate::model::address::EmailAddress;
use crate::model::attachment::{AttachmentDescriptor, AttachmentKind};
use crate::model::message::BodyVariants;
use crate::parser::header::{
    self, extract_all_angle_brackets, extract_angle_bracket, get_header, parse_date,
};

/// Scheme under which attached RFC 822 messages are extracted.
pub const MESSAGE_SCHEME: &str = "eml";

/// Everything read out of one byte-exact message.
///
/// Fields that were present but unreadable are kept as [`ParseWarning`]s so
/// that the caller decides how loudly to report them.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// The message bytes, without any MBOX `From ` line.
    pub raw: Vec<u8>,
    /// Unfolded header lines in source order.
    pub headers: Vec<(String, String)>,
    pub subject: Option<String>,
    /// Message-ID exactly as written in the header.
    pub message_id: Option<String>,
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub return_path: Option<String>,
    pub sent_date: Result<Option<DateTime<Utc>>, ParseWarning>,
    pub received_date: Result<Option<DateTime<Utc>>, ParseWarning>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub bodies: BodyVariants,
    pub attachments: Vec<AttachmentDescriptor>,
    /// Set when the MIME structure could not be parsed and a fallback was used.
    pub structure_warning: Option<ParseWarning>,
}

/// Parse a complete raw message (headers + body).
///
/// Uses `mail-parser` for the MIME structure, with the raw header block as
/// the source of truth for identifiers so they are preserved verbatim.
pub fn parse_message(raw_message: &[u8]) -> ParsedMessage {
    let raw = crate::parser::mbox::strip_from_line(raw_message).to_vec();
    let (header_block, body) = header::split_header_block(&raw);
    let headers = header::parse_raw_headers(header_block);

    let message_id = get_header(&headers, "message-id")
        .map(extract_angle_bracket)
        .filter(|id| !id.is_empty());
    let in_reply_to = get_header(&headers, "in-reply-to")
        .map(extract_angle_bracket)
        .filter(|id| !id.is_empty());
    let references = get_header(&headers, "references")
        .map(extract_all_angle_brackets)
        .unwrap_or_default();
    let return_path = get_header(&headers, "return-path")
        .map(|v| {
            extract_angle_bracket(v)
                .trim_matches(|c| c == '<' || c == '>')
                .to_string()
        })
        .filter(|v| !v.is_empty());
    let received_date = received_date(&headers);

    let parser = MessageParser::default();
    let Some(msg) = parser.parse(&raw) else {
        let text = header::decode_text_bytes(body);
        let sent_date = fallback_date(&headers);
        return ParsedMessage {
            subject: get_header(&headers, "subject").map(str::to_string),
            from: get_header(&headers, "from").map(EmailAddress::parse),
            to: get_header(&headers, "to")
                .map(EmailAddress::parse_list)
                .unwrap_or_default(),
            cc: get_header(&headers, "cc")
                .map(EmailAddress::parse_list)
                .unwrap_or_default(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            sent_date,
            received_date,
            message_id,
            in_reply_to,
            references,
            return_path,
            bodies: BodyVariants {
                text: Some(text),
                ..Default::default()
            },
            attachments: Vec::new(),
            structure_warning: Some(ParseWarning::new(
                "structure",
                "MIME structure unreadable, body kept as plain text",
            )),
            headers,
            raw,
        };
    };

    let sent_date = match msg.date() {
        Some(date) => Ok(Utc.timestamp_opt(date.to_timestamp(), 0).single()),
        None => fallback_date(&headers),
    };

    let mut bodies = BodyVariants::default();
    for id in &msg.text_body {
        if let Some(PartType::Text(text)) = msg.parts.get(*id).map(|p| &p.body) {
            bodies.text = Some(text.to_string());
            break;
        }
    }
    for id in &msg.html_body {
        if let Some(PartType::Html(html)) = msg.parts.get(*id).map(|p| &p.body) {
            bodies.html = Some(html.to_string());
            break;
        }
    }

    let mut attachments = Vec::with_capacity(msg.attachments.len());
    for id in &msg.attachments {
        let Some(part) = msg.parts.get(*id) else {
            continue;
        };
        attachments.push(attachment_from_part(part, attachments.len()));
    }

    // A lone rich-text body arrives as an attachment; treat it as the rich-text variant.
    if bodies.text.is_none() && bodies.html.is_none() {
        if let Some(pos) = attachments.iter().position(|a| {
            a.name.is_none() && a.kind == AttachmentKind::File && is_rtf_media(a.media_type_or_default())
        }) {
            let rtf = attachments.remove(pos);
            bodies.rtf = Some(header::decode_text_bytes(&rtf.content));
        }
    }

    ParsedMessage {
        subject: msg.subject().map(str::to_string),
        from: msg.from().and_then(|a| addresses(a).into_iter().next()),
        to: msg.to().map(addresses).unwrap_or_default(),
        cc: msg.cc().map(addresses).unwrap_or_default(),
        bcc: msg.bcc().map(addresses).unwrap_or_default(),
        reply_to: msg.reply_to().map(addresses).unwrap_or_default(),
        sent_date,
        received_date,
        message_id,
        in_reply_to,
        references,
        return_path,
        bodies,
        attachments,
        structure_warning: None,
        headers,
        raw: raw.clone(),
    }
}

fn is_rtf_media(media_type: &str) -> bool {
    media_type.eq_ignore_ascii_case("text/rtf") || media_type.eq_ignore_ascii_case("application/rtf")
}

/// Date from the raw `Date:` header when `mail-parser` could not read it.
fn fallback_date(headers: &[(String, String)]) -> Result<Option<DateTime<Utc>>, ParseWarning> {
    match get_header(headers, "date") {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| ParseWarning::new("sent_date", format!("unreadable date '{raw}'"))),
    }
}

/// Reception date: the timestamp after `;` in the topmost `Received:` header.
fn received_date(headers: &[(String, String)]) -> Result<Option<DateTime<Utc>>, ParseWarning> {
    let Some(received) = get_header(headers, "received") else {
        return Ok(None);
    };
    let Some(pos) = received.rfind(';') else {
        return Err(ParseWarning::new("received_date", "Received header without date"));
    };
    let raw = received[pos + 1..].trim();
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| ParseWarning::new("received_date", format!("unreadable date '{raw}'")))
}

fn addresses(address: &mail_parser::Address<'_>) -> Vec<EmailAddress> {
    let convert = |addr: &mail_parser::Addr<'_>| EmailAddress {
        display_name: addr.name.as_deref().unwrap_or_default().to_string(),
        address: addr.address.as_deref().unwrap_or_default().to_string(),
    };
    match address {
        mail_parser::Address::List(list) => list.iter().map(convert).collect::<Vec<_>>(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().map(convert))
            .collect::<Vec<_>>(),
    }
    .into_iter()
    .filter(|a| !a.is_empty())
    .collect()
}

fn attachment_from_part(part: &mail_parser::MessagePart<'_>, index: usize) -> AttachmentDescriptor {
    let media_type = part.content_type().map(|ct| match ct.subtype() {
        Some(sub) => format!("{}/{}", ct.ctype(), sub).to_lowercase(),
        None => ct.ctype().to_lowercase(),
    });
    let disposition = part.content_disposition();
    let is_attachment_disposition = disposition
        .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false);
    let content_id = part
        .content_id()
        .map(|cid| cid.trim_matches(|c| c == '<' || c == '>').to_string())
        .filter(|cid| !cid.is_empty());
    let disposition_date = |name: &str| {
        disposition
            .and_then(|d| d.attribute(name))
            .and_then(parse_date)
    };

    let (content, kind, scheme) = match &part.body {
        PartType::Message(nested) => (
            nested.raw_message.to_vec(),
            AttachmentKind::Container,
            Some(MESSAGE_SCHEME.to_string()),
        ),
        _ => {
            let kind = if content_id.is_some() && !is_attachment_disposition {
                AttachmentKind::Inline
            } else {
                AttachmentKind::File
            };
            (part.contents().to_vec(), kind, None)
        }
    };

    let mut name = part.attachment_name().map(str::to_string);
    if name.is_none() && kind == AttachmentKind::Container {
        name = Some(format!("message_{index}.eml"));
    }

    AttachmentDescriptor {
        content,
        scheme,
        name,
        created: disposition_date("creation-date"),
        modified: disposition_date("modification-date"),
        media_type,
        content_id,
        kind,
    }
}

/// Convert HTML to plain text.
///
/// Block-level tags become line breaks, links keep their target as
/// `text [url]`, scripts and styles are dropped, common entities are decoded
/// and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    const BLOCK_TAGS: [&str; 14] = [
        "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "blockquote",
        "hr",
    ];

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let mut pending_href: Vec<Option<String>> = Vec::new();

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = &after[..gt];
        rest = &after[gt + 1..];

        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if !closing && (name == "script" || name == "style") {
            let close = format!("</{name}");
            rest = match rest.to_ascii_lowercase().find(&close) {
                Some(end) => rest[end..].find('>').map(|g| &rest[end + g + 1..]).unwrap_or(""),
                None => "",
            };
            continue;
        }

        if name == "a" {
            if closing {
                if let Some(Some(href)) = pending_href.pop() {
                    out.push_str(&format!(" [{href}]"));
                }
            } else {
                pending_href.push(attribute_value(tag, "href"));
            }
        } else if name == "li" && !closing {
            out.push_str("\n- ");
        } else if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        }
    }
    out.push_str(rest);

    let decoded = decode_entities(&out);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_was_blank = false;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank && !cleaned.is_empty() {
                cleaned.push('\n');
            }
            prev_was_blank = true;
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn attribute_value(tag: &str, attribute: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let pos = lower.find(&format!("{attribute}="))?;
    let value = &tag[pos + attribute.len() + 1..];
    let value = match value.chars().next()? {
        q @ ('"' | '\'') => value[1..].split(q).next()?,
        _ => value.split(|c: char| c.is_whitespace()).next()?,
    };
    Some(value.to_string()).filter(|v| !v.is_empty() && !v.starts_with('#'))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From sender@example.org Thu Jan  4 10:00:00 2024\n\
Return-Path: <bounce@example.org>\n\
Received: from mx.example.org by mail.example.org; Thu, 04 Jan 2024 10:00:05 +0000\n\
From: Test Sender <sender@example.org>\n\
To: a@example.org, \"Doe, Jane\" <jane@example.org>\n\
Subject: =?UTF-8?Q?Caf=C3=A9?=\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\n\
Message-ID: <abc123@example.org>\n\
In-Reply-To: <parent@example.org>\n\
References: <root@example.org> <parent@example.org>\n\
\n\
Hello there\n";

    #[test]
    fn test_parse_simple_message() {
        let msg = parse_message(SIMPLE);
        assert!(msg.raw.starts_with(b"Return-Path:"));
        assert_eq!(msg.subject.as_deref(), Some("Café"));
        assert_eq!(msg.message_id.as_deref(), Some("<abc123@example.org>"));
        assert_eq!(msg.from.as_ref().unwrap().address, "sender@example.org");
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.to[1].display_name, "Doe, Jane");
        assert_eq!(msg.return_path.as_deref(), Some("bounce@example.org"));
        assert_eq!(msg.in_reply_to.as_deref(), Some("<parent@example.org>"));
        assert_eq!(msg.references.len(), 2);
        assert!(msg.sent_date.as_ref().unwrap().is_some());
        let received = msg.received_date.clone().unwrap().unwrap();
        assert_eq!(received.format("%S").to_string(), "05");
        assert_eq!(msg.bodies.text().map(str::trim), Some("Hello there"));
        assert!(msg.attachments.is_empty());
        assert!(msg.structure_warning.is_none());
    }

    #[test]
    fn test_unreadable_date_is_a_warning() {
        let msg = parse_message(b"Subject: x\nDate: sometime soon\n\nbody\n");
        let warning = msg.sent_date.unwrap_err();
        assert_eq!(warning.field, "sent_date");
    }

    #[test]
    fn test_attachments_and_inline_parts() {
        let raw = b"From: a@example.org\r\n\
Subject: parts\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: multipart/related; boundary=\"b2\"\r\n\
\r\n\
--b2\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hi <img src=\"cid:img1\"></p>\r\n\
--b2\r\n\
Content-Type: image/png\r\n\
Content-ID: <img1>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--b2--\r\n\
--b1\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--b1\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
From: inner@example.org\r\n\
Subject: inner\r\n\
\r\n\
inner body\r\n\
--b1--\r\n";
        let msg = parse_message(raw);
        assert!(msg.bodies.html().unwrap().contains("Hi"));
        let inline = msg
            .attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Inline)
            .expect("inline part");
        assert_eq!(inline.content_id.as_deref(), Some("img1"));
        assert_eq!(inline.content, b"\x89PNG\r\n\x1a\n");
        let pdf = msg
            .attachments
            .iter()
            .find(|a| a.name.as_deref() == Some("report.pdf"))
            .expect("pdf attachment");
        assert_eq!(pdf.kind, AttachmentKind::File);
        assert_eq!(pdf.media_type.as_deref(), Some("application/pdf"));
        assert!(pdf.content.starts_with(b"%PDF"));
        let nested = msg
            .attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Container)
            .expect("attached message");
        assert_eq!(nested.scheme.as_deref(), Some(MESSAGE_SCHEME));
        assert!(nested.content.windows(5).any(|w| w == b"inner"));
    }

    #[test]
    fn test_html_to_text_basic() {
        let text = html_to_text("<p>Hello <b>world</b></p><p>Second paragraph</p>");
        assert_eq!(text, "Hello world\nSecond paragraph");
    }

    #[test]
    fn test_html_to_text_links_and_lists() {
        let text = html_to_text("<ul><li>one</li><li><a href=\"https://x.org\">two</a></li></ul>");
        assert!(text.contains("- one"));
        assert!(text.contains("- two [https://x.org]"));
    }

    #[test]
    fn test_html_to_text_entities_and_scripts() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(
            html_to_text("Before<script>alert('x')</script>After<STYLE>p{}</STYLE>"),
            "BeforeAfter"
        );
    }
}
