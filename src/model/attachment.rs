//! Attachment descriptors as handed over by native readers.

use chrono::{DateTime, Utc};

/// How an attachment is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// A regular file attachment.
    File,
    /// An inline part referenced from an HTML or rich-text body (usually by Content-ID).
    Inline,
    /// The payload is itself a mail store that gets extracted recursively.
    Container,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Inline => "inline",
            Self::Container => "container",
        }
    }
}

/// One attachment of a message.
///
/// The content is opaque bytes; `scheme` names the store reader to use when
/// `kind` is [`AttachmentKind::Container`].
#[derive(Debug, Clone)]
pub struct AttachmentDescriptor {
    /// Raw, transfer-decoded content.
    pub content: Vec<u8>,
    /// Registered store scheme when the content is a mail store.
    pub scheme: Option<String>,
    /// File name, if the source provided one.
    pub name: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    /// MIME media type (e.g. `"image/png"`).
    pub media_type: Option<String>,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    pub kind: AttachmentKind,
}

impl AttachmentDescriptor {
    /// A file attachment with the given name and content.
    pub fn file(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            content,
            scheme: None,
            name: Some(name.into()),
            created: None,
            modified: None,
            media_type: None,
            content_id: None,
            kind: AttachmentKind::File,
        }
    }

    /// An inline part referenced by `content_id`.
    pub fn inline(content_id: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            content_id: Some(content_id.into()),
            kind: AttachmentKind::Inline,
            name: None,
            ..Self::file("", content)
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self.kind = AttachmentKind::Container;
        self
    }

    /// Media type, or `application/octet-stream` when unknown.
    pub fn media_type_or_default(&self) -> &str {
        self.media_type
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
    }

    /// The name to use for files and nodes; falls back to a generated one.
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match &self.content_id {
                Some(cid) if !cid.is_empty() => cid.clone(),
                _ => format!("attachment_{index}"),
            },
        }
    }
}
