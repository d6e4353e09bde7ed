//! Native reader contract and the bundled store readers.
//!
//! The extraction engine only sees these traits: one [`StoreReader`] per
//! scheme opens a [`NativeFolder`] tree whose leaves are [`NativeElement`]s.

pub mod eml;
pub mod mbox;
pub mod mboxdir;
pub mod memory;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FieldResult, Result};
use crate::model::address::EmailAddress;
use crate::model::attachment::AttachmentDescriptor;
use crate::model::message::{Appointment, BodyVariants};

/// Where a store lives: a server account, a path, or bytes in memory.
#[derive(Clone, Default)]
pub struct StoreSource {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub path: Option<PathBuf>,
    /// In-memory content, used for nested containers that need no file.
    pub content: Option<Arc<[u8]>>,
}

impl StoreSource {
    /// A store in a local file or directory.
    pub fn path(scheme: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            scheme: scheme.into(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// A store held in memory.
    pub fn bytes(scheme: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            scheme: scheme.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Human-readable location, without credentials.
    pub fn describe(&self) -> String {
        let mut out = format!("{}:", self.scheme);
        if let Some(host) = &self.host {
            out.push_str("//");
            if let Some(user) = &self.user {
                out.push_str(&format!("{user}@"));
            }
            out.push_str(host);
            if let Some(port) = self.port {
                out.push_str(&format!(":{port}"));
            }
        }
        if let Some(path) = &self.path {
            out.push_str(&path.display().to_string());
        } else if let Some(content) = &self.content {
            out.push_str(&format!("<{} bytes>", content.len()));
        }
        out
    }
}

impl fmt::Debug for StoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSource")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("path", &self.path)
            .field("content", &self.content.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// Opens the root folder of one kind of store.
pub trait StoreReader: Send + Sync {
    fn open(&self, source: &StoreSource) -> Result<Box<dyn NativeFolder>>;

    /// Whether nested content must be materialized to a file before opening.
    fn needs_file(&self) -> bool {
        false
    }
}

/// A folder of a native store.
pub trait NativeFolder {
    fn name(&self) -> &str;

    fn has_elements(&self) -> bool;

    fn has_subfolders(&self) -> bool;

    /// Visit each direct subfolder in source order.
    ///
    /// A subfolder that cannot be opened is handed to `visit` as its error,
    /// so the caller decides whether the siblings still get visited.
    fn for_each_subfolder(
        &mut self,
        visit: &mut dyn FnMut(Result<&mut dyn NativeFolder>) -> Result<()>,
    ) -> Result<()>;

    /// Visit each message of this folder in source order. An error returned by
    /// `visit` stops the walk and is passed through.
    fn for_each_element(
        &mut self,
        visit: &mut dyn FnMut(&dyn NativeElement) -> Result<()>,
    ) -> Result<()>;
}

/// One message of a native store.
///
/// Getters report unreadable data as a [`ParseWarning`](crate::error::ParseWarning);
/// absent data is `Ok` with an empty value.
pub trait NativeElement {
    fn subject(&self) -> FieldResult<Option<String>>;
    fn message_id(&self) -> FieldResult<Option<String>>;
    fn from(&self) -> FieldResult<Option<EmailAddress>>;
    fn to(&self) -> FieldResult<Vec<EmailAddress>>;
    fn cc(&self) -> FieldResult<Vec<EmailAddress>>;
    fn bcc(&self) -> FieldResult<Vec<EmailAddress>>;
    fn reply_to(&self) -> FieldResult<Vec<EmailAddress>>;
    fn return_path(&self) -> FieldResult<Option<String>>;
    fn sent_date(&self) -> FieldResult<Option<DateTime<Utc>>>;
    fn received_date(&self) -> FieldResult<Option<DateTime<Utc>>>;
    fn in_reply_to(&self) -> FieldResult<Option<String>>;
    fn references(&self) -> FieldResult<Vec<String>>;
    fn bodies(&self) -> FieldResult<BodyVariants>;
    fn attachments(&self) -> FieldResult<Vec<AttachmentDescriptor>>;

    fn appointment(&self) -> FieldResult<Option<Appointment>> {
        Ok(None)
    }

    /// Header lines to use as the baseline of a synthesized message.
    fn raw_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// The byte-exact wire-format message, when the store has one.
    fn native_content(&self) -> Option<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_hides_password() {
        let source = StoreSource {
            scheme: "imap".into(),
            host: Some("mail.example.org".into()),
            port: Some(993),
            user: Some("ana".into()),
            password: Some("secret".into()),
            path: Some(PathBuf::from("/INBOX")),
            content: None,
        };
        assert_eq!(source.describe(), "imap://ana@mail.example.org:993/INBOX");
        assert!(!format!("{source:?}").contains("secret"));
    }

    #[test]
    fn test_bytes_source() {
        let source = StoreSource::bytes("eml", b"Subject: x\n\n".to_vec());
        assert_eq!(source.describe(), "eml:<12 bytes>");
    }
}
