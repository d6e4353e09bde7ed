//! In-memory structured store.
//!
//! Messages are given as normalized fields with no byte-exact content, which
//! is how readers of proprietary record formats hand messages over. Hosts
//! register a [`MemoryReader`] for such stores; tests use it to build
//! arbitrary folder trees.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FieldResult, Result};
use crate::model::address::EmailAddress;
use crate::model::attachment::AttachmentDescriptor;
use crate::model::message::{Appointment, BodyVariants, MessageFields};

use super::{NativeElement, NativeFolder, StoreReader, StoreSource};

/// A message made of structured fields.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessage {
    pub fields: MessageFields,
    pub attachments: Vec<AttachmentDescriptor>,
    /// Byte-exact content, when the producer has it.
    pub native: Option<Vec<u8>>,
}

impl MemoryMessage {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            fields: MessageFields {
                subject: subject.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.fields.bodies.text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.fields.bodies.html = Some(html.into());
        self
    }

    pub fn with_rtf(mut self, rtf: impl Into<String>) -> Self {
        self.fields.bodies.rtf = Some(rtf.into());
        self
    }

    pub fn with_from(mut self, from: EmailAddress) -> Self {
        self.fields.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: EmailAddress) -> Self {
        self.fields.to.push(to);
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.fields.message_id = Some(id.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.fields.sent_date = Some(date);
        self
    }

    pub fn with_appointment(mut self, appointment: Appointment) -> Self {
        self.fields.appointment = Some(appointment);
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentDescriptor) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A folder tree of structured messages.
#[derive(Debug, Clone, Default)]
pub struct MemoryFolder {
    pub name: String,
    pub messages: Vec<MemoryMessage>,
    pub subfolders: Vec<MemoryFolder>,
}

impl MemoryFolder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: MemoryMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_subfolder(mut self, folder: MemoryFolder) -> Self {
        self.subfolders.push(folder);
        self
    }
}

/// Serves one fixed [`MemoryFolder`] tree, whatever the source says.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    root: Arc<MemoryFolder>,
}

impl MemoryReader {
    pub fn new(root: MemoryFolder) -> Self {
        Self {
            root: Arc::new(root),
        }
    }
}

impl StoreReader for MemoryReader {
    fn open(&self, _source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
        Ok(Box::new(self.root.as_ref().clone()))
    }
}

impl NativeFolder for MemoryFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_elements(&self) -> bool {
        !self.messages.is_empty()
    }

    fn has_subfolders(&self) -> bool {
        !self.subfolders.is_empty()
    }

    fn for_each_subfolder(
        &mut self,
        visit: &mut dyn FnMut(Result<&mut dyn NativeFolder>) -> Result<()>,
    ) -> Result<()> {
        for folder in &mut self.subfolders {
            visit(Ok(folder))?;
        }
        Ok(())
    }

    fn for_each_element(
        &mut self,
        visit: &mut dyn FnMut(&dyn NativeElement) -> Result<()>,
    ) -> Result<()> {
        for message in &self.messages {
            visit(message)?;
        }
        Ok(())
    }
}

impl NativeElement for MemoryMessage {
    fn subject(&self) -> FieldResult<Option<String>> {
        Ok(Some(self.fields.subject.clone()).filter(|s| !s.is_empty()))
    }

    fn message_id(&self) -> FieldResult<Option<String>> {
        Ok(self.fields.message_id.clone())
    }

    fn from(&self) -> FieldResult<Option<EmailAddress>> {
        Ok(self.fields.from.clone())
    }

    fn to(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.fields.to.clone())
    }

    fn cc(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.fields.cc.clone())
    }

    fn bcc(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.fields.bcc.clone())
    }

    fn reply_to(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.fields.reply_to.clone())
    }

    fn return_path(&self) -> FieldResult<Option<String>> {
        Ok(self.fields.return_path.clone())
    }

    fn sent_date(&self) -> FieldResult<Option<DateTime<Utc>>> {
        Ok(self.fields.sent_date)
    }

    fn received_date(&self) -> FieldResult<Option<DateTime<Utc>>> {
        Ok(self.fields.received_date)
    }

    fn in_reply_to(&self) -> FieldResult<Option<String>> {
        Ok(self.fields.in_reply_to.clone())
    }

    fn references(&self) -> FieldResult<Vec<String>> {
        Ok(self.fields.references.clone())
    }

    fn bodies(&self) -> FieldResult<BodyVariants> {
        Ok(self.fields.bodies.clone())
    }

    fn attachments(&self) -> FieldResult<Vec<AttachmentDescriptor>> {
        Ok(self.attachments.clone())
    }

    fn appointment(&self) -> FieldResult<Option<Appointment>> {
        Ok(self.fields.appointment.clone())
    }

    fn raw_headers(&self) -> Vec<(String, String)> {
        self.fields.raw_headers.clone()
    }

    fn native_content(&self) -> Option<Vec<u8>> {
        self.native.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_walk() {
        let root = MemoryFolder::new("root")
            .with_subfolder(
                MemoryFolder::new("Inbox")
                    .with_message(MemoryMessage::new("a"))
                    .with_message(MemoryMessage::new("b")),
            )
            .with_subfolder(MemoryFolder::new("Trash"));
        let reader = MemoryReader::new(root);
        let mut folder = reader.open(&StoreSource::default()).unwrap();
        assert!(!folder.has_elements());
        let mut names = Vec::new();
        folder
            .for_each_subfolder(&mut |sub| {
                let sub = sub?;
                let mut subjects = Vec::new();
                sub.for_each_element(&mut |m| {
                    subjects.push(m.subject().unwrap().unwrap_or_default());
                    Ok(())
                })?;
                names.push((sub.name().to_string(), subjects));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            names,
            vec![
                ("Inbox".to_string(), vec!["a".to_string(), "b".to_string()]),
                ("Trash".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_structured_message_has_no_native_content() {
        let message = MemoryMessage::new("x").with_text("body");
        assert!(message.native_content().is_none());
        assert_eq!(message.bodies().unwrap().text(), Some("body"));
    }
}
