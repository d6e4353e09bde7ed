//! Per-message normalization and packaging.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, warn};

use crate::archive::metadata::MetadataTree;
use crate::archive::naming::NodeKind;
use crate::archive::node::{ArchiveNode, PayloadUsage};
use crate::error::{FieldResult, Result, WarningLevel};
use crate::model::attachment::{AttachmentDescriptor, AttachmentKind};
use crate::model::message::{Appointment, BodyVariants, MessageFields};
use crate::parser::mime::html_to_text;
use crate::parser::rtf::{self, Encapsulated};
use crate::store::NativeElement;
use crate::synth::MessageSynthesizer;

use super::context::ExtractionContext;
use super::progress::ProgressEvent;
use super::registry::SchemeRegistry;

/// File name of a message's byte-exact payload.
const MESSAGE_FILE: &str = "message.eml";
/// File name of a message's extracted text.
const MESSAGE_TEXT_FILE: &str = "message.txt";

/// What a folder needs to know about a packaged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOutcome {
    pub sent_date: Option<DateTime<Utc>>,
    /// Size of the byte-exact content, native or synthesized.
    pub size: u64,
}

/// One message, normalized and ready to be packaged.
#[derive(Debug, Clone)]
pub struct MessageElement {
    fields: MessageFields,
    attachments: Vec<AttachmentDescriptor>,
    native: Option<Vec<u8>>,
}

impl MessageElement {
    /// Read every field from the native element.
    ///
    /// Unreadable fields are defaulted and reported at `warning_level`.
    pub fn analyze(element: &dyn NativeElement, warning_level: WarningLevel) -> Self {
        let message_id = element.message_id();
        let label = match &message_id {
            Ok(Some(id)) => id.clone(),
            _ => "message".to_string(),
        };

        let fields = MessageFields {
            subject: take_or_default(warning_level, &label, element.subject()).unwrap_or_default(),
            message_id: take_or_default(warning_level, &label, message_id),
            from: take_or_default(warning_level, &label, element.from()),
            to: take_or_default(warning_level, &label, element.to()),
            cc: take_or_default(warning_level, &label, element.cc()),
            bcc: take_or_default(warning_level, &label, element.bcc()),
            reply_to: take_or_default(warning_level, &label, element.reply_to()),
            return_path: take_or_default(warning_level, &label, element.return_path()),
            sent_date: take_or_default(warning_level, &label, element.sent_date()),
            received_date: take_or_default(warning_level, &label, element.received_date()),
            in_reply_to: take_or_default(warning_level, &label, element.in_reply_to()),
            references: take_or_default(warning_level, &label, element.references()),
            bodies: take_or_default(warning_level, &label, element.bodies()),
            appointment: take_or_default(warning_level, &label, element.appointment()),
            raw_headers: element.raw_headers(),
        };
        let attachments = take_or_default(warning_level, &label, element.attachments());

        Self {
            fields,
            attachments,
            native: element.native_content(),
        }
    }

    pub fn fields(&self) -> &MessageFields {
        &self.fields
    }

    pub fn attachments(&self) -> &[AttachmentDescriptor] {
        &self.attachments
    }

    /// Trim the body variants; replace a rich-text body by the HTML or text it encapsulates.
    pub fn optimize_bodies(&mut self) {
        let bodies = &mut self.fields.bodies;
        for variant in [&mut bodies.text, &mut bodies.html, &mut bodies.rtf] {
            *variant = variant
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        let Some(rtf_source) = bodies.rtf.as_deref() else {
            return;
        };
        match rtf::de_encapsulate(rtf_source) {
            Some(Encapsulated::Html(html)) if bodies.html.is_none() => {
                bodies.html = Some(html.trim().to_string());
                bodies.rtf = None;
            }
            Some(Encapsulated::Text(text)) if bodies.text.is_none() => {
                bodies.text = Some(text.trim().to_string());
                bodies.rtf = None;
            }
            _ => {}
        }
    }

    /// Flag attachments whose content is a registered container store.
    pub fn classify_attachments(&mut self, registry: &SchemeRegistry) {
        for attachment in &mut self.attachments {
            if attachment.kind == AttachmentKind::Container {
                continue;
            }
            let sniffed = registry.sniffer().sniff(&attachment.content);
            if let Some(entry) = registry.for_media_type(&sniffed).filter(|e| e.container) {
                attachment.kind = AttachmentKind::Container;
                attachment.scheme = Some(entry.scheme.clone());
            }
            if attachment.media_type.as_deref().map_or(true, str::is_empty) {
                attachment.media_type = Some(sniffed);
            }
        }
    }

    /// Package the message below `parent_dir`.
    pub fn extract(mut self, ctx: &mut ExtractionContext, parent_dir: &Path) -> Result<ElementOutcome> {
        ctx.check_cancelled()?;
        self.optimize_bodies();
        self.classify_attachments(ctx.registry());

        let title = if self.fields.subject.trim().is_empty() {
            "message".to_string()
        } else {
            self.fields.subject.clone()
        };
        let settings = ctx.node_settings();
        let message_dir = parent_dir.join(ctx.node_dir_name(NodeKind::Message, &title, false));
        let mut message_node = ArchiveNode::new(message_dir.clone(), NodeKind::Message, settings);
        self.describe(&mut message_node, ctx.options().extract_appointments);

        let is_native = self.native.is_some();
        let content = match self.native.take() {
            Some(native) => Some(native),
            None => match MessageSynthesizer.synthesize(&self.fields, &self.attachments) {
                Ok(synthesized) => Some(synthesized),
                Err(e) => {
                    error!(message = %title, error = %e, "Packaging message without byte-exact content");
                    None
                }
            },
        };
        let size = content.as_ref().map_or(0, |c| c.len() as u64);

        let body_dir = message_dir.join(ctx.node_dir_name(NodeKind::Body, &title, true));
        let mut body_node = ArchiveNode::new(body_dir, NodeKind::Body, settings);
        body_node.add_metadata("Origin", Some(if is_native { "native" } else { "synthesized" }), false);
        if let Some(content) = content {
            body_node.add_payload(
                content,
                MESSAGE_FILE,
                PayloadUsage::BinaryMaster,
                1,
                Some("message/rfc822"),
            );
        }
        if ctx.options().extract_text {
            if let Some(text) = body_text(&self.fields.bodies) {
                body_node.add_payload(
                    text.into_bytes(),
                    MESSAGE_TEXT_FILE,
                    PayloadUsage::TextContent,
                    1,
                    Some("text/plain"),
                );
            }
        }
        body_node.write()?;

        for (index, attachment) in std::mem::take(&mut self.attachments).into_iter().enumerate() {
            package_attachment(ctx, &message_dir, index, attachment)?;
        }

        message_node.add_metadata("Size", Some(size.to_string()), false);
        message_node.write()?;

        ctx.emit(ProgressEvent::ElementDone {
            subject: self.fields.subject.clone(),
            size,
        });
        Ok(ElementOutcome {
            sent_date: self.fields.sent_date,
            size,
        })
    }

    fn describe(&self, node: &mut ArchiveNode, with_appointment: bool) {
        let fields = &self.fields;
        node.add_metadata("Subject", Some(fields.subject.as_str()), true);
        node.add_metadata("MessageID", fields.message_id.as_deref(), true);
        node.add_metadata("From", fields.from.as_ref().map(|a| a.display()), false);
        node.add_repeated_metadata("To", fields.to.iter().map(|a| a.display()));
        node.add_repeated_metadata("Cc", fields.cc.iter().map(|a| a.display()));
        node.add_repeated_metadata("Bcc", fields.bcc.iter().map(|a| a.display()));
        node.add_repeated_metadata("ReplyTo", fields.reply_to.iter().map(|a| a.display()));
        node.add_metadata("ReturnPath", fields.return_path.as_deref(), false);
        node.add_metadata("SentDate", fields.sent_date.map(timestamp), true);
        node.add_metadata("ReceivedDate", fields.received_date.map(timestamp), false);
        node.add_metadata("InReplyTo", fields.in_reply_to.as_deref(), false);
        node.add_repeated_metadata("References", fields.references.iter().map(String::as_str));
        node.add_repeated_metadata("BodyFormat", body_formats(&fields.bodies));
        node.add_metadata("AttachmentCount", Some(self.attachments.len().to_string()), false);
        if with_appointment {
            if let Some(appointment) = &fields.appointment {
                node.add_group("Event", appointment_metadata(appointment));
            }
        }
    }
}

fn take_or_default<T: Default>(level: WarningLevel, label: &str, result: FieldResult<T>) -> T {
    result.unwrap_or_else(|warning| {
        level.report(label, &warning);
        T::default()
    })
}

/// Container attachments are extracted recursively, falling back to a plain
/// file node when that is impossible; everything else becomes a file node.
fn package_attachment(
    ctx: &mut ExtractionContext,
    message_dir: &Path,
    index: usize,
    attachment: AttachmentDescriptor,
) -> Result<()> {
    if attachment.kind == AttachmentKind::Container {
        let name = attachment.display_name(index);
        match ctx.new_nested(&attachment, message_dir, index) {
            Ok(mut nested) => {
                let result = nested.run();
                if let Err(e) = nested.close() {
                    warn!(attachment = %name, error = %e, "Failed to release temporary container file");
                }
                match result {
                    Ok(_) => {
                        ctx.absorb_nested(&nested);
                        return Ok(());
                    }
                    Err(e) if e.is_job_fatal() => {
                        ctx.absorb_nested(&nested);
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(attachment = %name, error = %e, "Nested extraction failed, keeping the attachment as a file");
                        nested.discard_output()?;
                    }
                }
            }
            Err(e) if e.is_job_fatal() => return Err(e),
            Err(e) => {
                warn!(attachment = %name, error = %e, "Keeping container attachment as a file");
            }
        }
    }
    write_file_attachment(ctx, message_dir, index, attachment)
}

fn write_file_attachment(
    ctx: &mut ExtractionContext,
    message_dir: &Path,
    index: usize,
    attachment: AttachmentDescriptor,
) -> Result<()> {
    let name = attachment.display_name(index);
    let media_type = attachment.media_type_or_default().to_string();
    let dir = message_dir.join(ctx.node_dir_name(NodeKind::Attachment, &name, true));
    let mut node = ArchiveNode::new(dir, NodeKind::Attachment, ctx.node_settings());
    node.add_metadata("Name", Some(name.as_str()), true);
    node.add_metadata("Kind", Some(attachment.kind.as_str()), false);
    node.add_metadata("MimeType", Some(media_type.as_str()), false);
    node.add_metadata("ContentID", attachment.content_id.as_deref(), false);
    node.add_metadata("CreatedDate", attachment.created.map(timestamp), false);
    node.add_metadata("ModifiedDate", attachment.modified.map(timestamp), false);
    node.add_metadata("Size", Some(attachment.content.len().to_string()), false);

    let text = if ctx.options().extract_text {
        ctx.registry()
            .text_extractor()
            .extract_text(&media_type, &attachment.content)
    } else {
        None
    };
    node.add_payload(
        attachment.content,
        &name,
        PayloadUsage::BinaryMaster,
        1,
        Some(&media_type),
    );
    if let Some(text) = text {
        node.add_payload(
            text.into_bytes(),
            &format!("{name}.txt"),
            PayloadUsage::TextContent,
            1,
            Some("text/plain"),
        );
    }
    node.write()
}

/// Plain text of a message: the text body, else converted HTML, else converted rich text.
fn body_text(bodies: &BodyVariants) -> Option<String> {
    let text = match (bodies.text(), bodies.html(), bodies.rtf()) {
        (Some(text), _, _) => text.to_string(),
        (None, Some(html), _) => html_to_text(html),
        (None, None, Some(rtf_source)) => rtf::rtf_to_text(rtf_source),
        (None, None, None) => return None,
    };
    Some(text).filter(|t| !t.trim().is_empty())
}

fn body_formats(bodies: &BodyVariants) -> Vec<&'static str> {
    [
        (bodies.text().is_some(), "text"),
        (bodies.html().is_some(), "html"),
        (bodies.rtf().is_some(), "rtf"),
    ]
    .into_iter()
    .filter_map(|(present, format)| present.then_some(format))
    .collect()
}

fn appointment_metadata(appointment: &Appointment) -> MetadataTree {
    let mut tree = MetadataTree::new();
    let entries = [
        ("Location", appointment.location.clone()),
        ("StartDate", appointment.start.map(timestamp)),
        ("EndDate", appointment.end.map(timestamp)),
        ("Organizer", appointment.organizer.as_ref().map(|a| a.display())),
        ("Recurrence", appointment.recurrence.clone()),
    ];
    for (key, value) in entries {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            tree.push_text(key, value);
        }
    }
    tree
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
