//! Byte-exact message synthesis from normalized fields.
//!
//! Used whenever a native reader cannot hand over the original wire-format
//! message. The MIME tree is built as
//! `mixed[ alternative[ text, related[ html-or-rtf, inline... ] ], attachment... ]`,
//! with single-child groups collapsed into their child.

use std::collections::HashSet;
use std::io::Write;

use mail_builder::headers::address::Address;
use mail_builder::headers::content_type::ContentType;
use mail_builder::headers::date::Date;
use mail_builder::headers::raw::Raw;
use mail_builder::headers::text::Text;
use mail_builder::headers::{Header, HeaderType};
use mail_builder::mime::{BodyPart, MimePart};
use sha2::{Digest, Sha256};

use crate::error::{PackError, Result};
use crate::model::address::EmailAddress;
use crate::model::attachment::{AttachmentDescriptor, AttachmentKind};
use crate::model::message::MessageFields;

/// Width at which long raw header values are folded.
const FOLD_WIDTH: usize = 78;

/// Which body variant owns the inline attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedPart {
    Rtf,
    Html,
}

/// Builds wire-format messages.
///
/// Output depends on the input only: multipart boundaries are derived from
/// the message content, and only headers the fields carry are written. A
/// message without a sent date gets no `Date` header, one without an id no
/// `Message-ID`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageSynthesizer;

impl MessageSynthesizer {
    /// The body variant inline attachments belong to: rich text first, then HTML.
    pub fn related_part(fields: &MessageFields) -> Option<RelatedPart> {
        if fields.bodies.rtf().is_some() {
            Some(RelatedPart::Rtf)
        } else if fields.bodies.html().is_some() {
            Some(RelatedPart::Html)
        } else {
            None
        }
    }

    /// Serialize `fields` and `attachments` into an RFC 5322 message.
    pub fn synthesize(
        &self,
        fields: &MessageFields,
        attachments: &[AttachmentDescriptor],
    ) -> Result<Vec<u8>> {
        let mut boundaries = Boundaries::new(fields, attachments);
        let body = build_body(fields, attachments, &mut boundaries);
        let mut out = Vec::with_capacity(4096);
        write_message(&mut out, fields, body).map_err(|e| PackError::Synthesis(e.to_string()))?;
        Ok(out)
    }
}

fn write_message(
    out: &mut Vec<u8>,
    fields: &MessageFields,
    body: MimePart<'_>,
) -> std::io::Result<()> {
    for (name, value) in headers(fields) {
        out.write_all(name.as_bytes())?;
        out.write_all(b": ")?;
        value.write_header(&mut *out, name.len() + 2)?;
    }
    out.write_all(b"MIME-Version: 1.0\r\n")?;
    body.write_part(&mut *out)?;
    Ok(())
}

/// Multipart boundaries, issued in tree order from a digest of the content.
struct Boundaries {
    seed: Vec<u8>,
    issued: u32,
}

impl Boundaries {
    fn new(fields: &MessageFields, attachments: &[AttachmentDescriptor]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fields.subject.as_bytes());
        hasher.update(fields.message_id.as_deref().unwrap_or_default().as_bytes());
        for body in [fields.bodies.text(), fields.bodies.html(), fields.bodies.rtf()] {
            hasher.update([0]);
            hasher.update(body.unwrap_or_default().as_bytes());
        }
        for attachment in attachments {
            hasher.update([1]);
            hasher.update(attachment.name.as_deref().unwrap_or_default().as_bytes());
            hasher.update(&attachment.content);
        }
        Self {
            seed: hasher.finalize().to_vec(),
            issued: 0,
        }
    }

    fn next(&mut self) -> String {
        self.issued += 1;
        let digest = Sha256::new()
            .chain_update(&self.seed)
            .chain_update(self.issued.to_be_bytes())
            .finalize();
        let hex: String = digest.iter().take(12).map(|b| format!("{b:02x}")).collect();
        format!("mailpack_{hex}")
    }
}

fn build_body<'x>(
    fields: &'x MessageFields,
    attachments: &'x [AttachmentDescriptor],
    boundaries: &mut Boundaries,
) -> MimePart<'x> {
    let bodies = &fields.bodies;
    let related = MessageSynthesizer::related_part(fields);
    let inline: Vec<&AttachmentDescriptor> = attachments
        .iter()
        .filter(|a| a.kind == AttachmentKind::Inline)
        .collect();
    let mut inline_placed = false;

    let mut alternative: Vec<MimePart<'x>> = Vec::with_capacity(3);
    if let Some(text) = bodies.text() {
        alternative.push(text_part("text/plain", text));
    } else if bodies.is_empty() {
        alternative.push(text_part("text/plain", ""));
    }

    for (variant, content, media_type) in [
        (RelatedPart::Html, bodies.html(), "text/html"),
        (RelatedPart::Rtf, bodies.rtf(), "text/rtf"),
    ] {
        let Some(content) = content else {
            continue;
        };
        let part = text_part(media_type, content);
        if related == Some(variant) && !inline.is_empty() {
            let mut children = Vec::with_capacity(inline.len() + 1);
            children.push(part);
            children.extend(inline.iter().map(|a| inline_part(a)));
            alternative.push(multipart("multipart/related", children, boundaries));
            inline_placed = true;
        } else {
            alternative.push(part);
        }
    }

    let alternative = collapse("multipart/alternative", alternative, boundaries);
    let mut mixed: Vec<MimePart<'x>> = Vec::with_capacity(attachments.len() + 1);
    mixed.push(alternative);
    for (index, attachment) in attachments.iter().enumerate() {
        match attachment.kind {
            AttachmentKind::Inline if !inline_placed => mixed.push(inline_part(attachment)),
            AttachmentKind::Inline => {}
            AttachmentKind::File | AttachmentKind::Container => {
                mixed.push(
                    MimePart::new(
                        ContentType::new(attachment.media_type_or_default()),
                        BodyPart::Binary(attachment.content.as_slice().into()),
                    )
                    .attachment(attachment.display_name(index)),
                );
            }
        }
    }
    collapse("multipart/mixed", mixed, boundaries)
}

fn text_part<'x>(media_type: &'x str, content: &'x str) -> MimePart<'x> {
    MimePart::new(
        ContentType::new(media_type).attribute("charset", "utf-8"),
        BodyPart::Text(content.into()),
    )
}

fn inline_part(attachment: &AttachmentDescriptor) -> MimePart<'_> {
    let part = MimePart::new(
        ContentType::new(attachment.media_type_or_default()),
        BodyPart::Binary(attachment.content.as_slice().into()),
    )
    .inline();
    match attachment.content_id.as_deref().filter(|c| !c.is_empty()) {
        Some(cid) => part.cid(cid),
        None => part,
    }
}

fn multipart<'x>(
    media_type: &'x str,
    children: Vec<MimePart<'x>>,
    boundaries: &mut Boundaries,
) -> MimePart<'x> {
    MimePart::new(
        ContentType::new(media_type).attribute("boundary", boundaries.next()),
        BodyPart::Multipart(children),
    )
}

/// A group of one part is that part.
fn collapse<'x>(
    media_type: &'x str,
    mut children: Vec<MimePart<'x>>,
    boundaries: &mut Boundaries,
) -> MimePart<'x> {
    if children.len() == 1 {
        if let Some(only) = children.pop() {
            return only;
        }
    }
    multipart(media_type, children, boundaries)
}

/// Headers set from normalized fields, by lowercase name.
fn overridden_headers(fields: &MessageFields) -> HashSet<&'static str> {
    let mut names = HashSet::new();
    let mut mark = |present: bool, name: &'static str| {
        if present {
            names.insert(name);
        }
    };
    mark(fields.return_path.is_some(), "return-path");
    mark(fields.from.is_some(), "from");
    mark(!fields.to.is_empty(), "to");
    mark(!fields.cc.is_empty(), "cc");
    mark(!fields.bcc.is_empty(), "bcc");
    mark(!fields.reply_to.is_empty(), "reply-to");
    mark(fields.sent_date.is_some(), "date");
    mark(!fields.subject.is_empty(), "subject");
    mark(fields.in_reply_to.is_some(), "in-reply-to");
    mark(!fields.references.is_empty(), "references");
    mark(fields.message_id.is_some(), "message-id");
    names
}

/// The header block: captured raw headers first, then the normalized fields.
fn headers(fields: &MessageFields) -> Vec<(&str, HeaderType<'_>)> {
    let overridden = overridden_headers(fields);
    let mut out: Vec<(&str, HeaderType<'_>)> = Vec::with_capacity(fields.raw_headers.len() + 12);
    for (name, value) in &fields.raw_headers {
        let lower = name.to_ascii_lowercase();
        if overridden.contains(lower.as_str())
            || lower.starts_with("content-")
            || lower == "mime-version"
        {
            continue;
        }
        out.push((name.as_str(), Raw::new(fold(value)).into()));
    }

    if let Some(return_path) = &fields.return_path {
        out.push(("Return-Path", Raw::new(format!("<{return_path}>")).into()));
    }
    if let Some(from) = &fields.from {
        out.push(("From", address(from).into()));
    }
    for (name, list) in [
        ("To", &fields.to),
        ("Cc", &fields.cc),
        ("Bcc", &fields.bcc),
        ("Reply-To", &fields.reply_to),
    ] {
        if !list.is_empty() {
            out.push((name, Address::new_list(list.iter().map(address).collect()).into()));
        }
    }
    if let Some(date) = fields.sent_date {
        out.push(("Date", Date::new(date.timestamp()).into()));
    }
    if !fields.subject.is_empty() {
        out.push(("Subject", Text::new(fields.subject.as_str()).into()));
    }
    if let Some(in_reply_to) = &fields.in_reply_to {
        out.push(("In-Reply-To", Raw::new(in_reply_to.as_str()).into()));
    }
    if !fields.references.is_empty() {
        out.push(("References", Raw::new(fold(&fields.references.join(" "))).into()));
    }
    if let Some(message_id) = &fields.message_id {
        out.push(("Message-ID", Raw::new(message_id.as_str()).into()));
    }
    out
}

fn address(addr: &EmailAddress) -> Address<'_> {
    let name = Some(addr.display_name.as_str()).filter(|n| !n.is_empty());
    Address::new_address(name, addr.address.as_str())
}

/// Fold a header value at whitespace so that lines stay near `FOLD_WIDTH`.
fn fold(value: &str) -> String {
    if value.len() <= FOLD_WIDTH {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 16);
    let mut line_len = 0;
    for word in value.split_whitespace() {
        if line_len > 0 && line_len + 1 + word.len() > FOLD_WIDTH {
            out.push_str("\r\n ");
            line_len = 1;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(word);
        line_len += word.len();
    }
    out
}
