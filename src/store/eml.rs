//! Single RFC 5322 message store (`.eml` files and attached messages).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{FieldResult, PackError, Result};
use crate::model::address::EmailAddress;
use crate::model::attachment::AttachmentDescriptor;
use crate::model::message::BodyVariants;
use crate::parser::mime::{parse_message, ParsedMessage};

use super::{NativeElement, NativeFolder, StoreReader, StoreSource};

/// Reader for one message, from a file or from in-memory bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmlReader;

impl StoreReader for EmlReader {
    fn open(&self, source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
        let (name, bytes) = match (&source.content, &source.path) {
            (Some(content), _) => ("message".to_string(), content.to_vec()),
            (None, Some(path)) => (file_stem(path), read_file(path)?),
            (None, None) => {
                return Err(PackError::access(
                    source.describe(),
                    "neither a path nor content given",
                ))
            }
        };
        Ok(Box::new(EmlFolder {
            name,
            message: parse_message(&bytes),
        }))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PackError::access(path.display(), "file not found")
        } else {
            PackError::io(path, e)
        }
    })
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A folder holding exactly one message.
pub struct EmlFolder {
    name: String,
    message: ParsedMessage,
}

impl NativeFolder for EmlFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_elements(&self) -> bool {
        true
    }

    fn has_subfolders(&self) -> bool {
        false
    }

    fn for_each_subfolder(
        &mut self,
        _visit: &mut dyn FnMut(Result<&mut dyn NativeFolder>) -> Result<()>,
    ) -> Result<()> {
        Ok(())
    }

    fn for_each_element(
        &mut self,
        visit: &mut dyn FnMut(&dyn NativeElement) -> Result<()>,
    ) -> Result<()> {
        visit(&self.message)
    }
}

impl NativeElement for ParsedMessage {
    fn subject(&self) -> FieldResult<Option<String>> {
        Ok(self.subject.clone())
    }

    fn message_id(&self) -> FieldResult<Option<String>> {
        Ok(self.message_id.clone())
    }

    fn from(&self) -> FieldResult<Option<EmailAddress>> {
        Ok(self.from.clone())
    }

    fn to(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.to.clone())
    }

    fn cc(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.cc.clone())
    }

    fn bcc(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.bcc.clone())
    }

    fn reply_to(&self) -> FieldResult<Vec<EmailAddress>> {
        Ok(self.reply_to.clone())
    }

    fn return_path(&self) -> FieldResult<Option<String>> {
        Ok(self.return_path.clone())
    }

    fn sent_date(&self) -> FieldResult<Option<DateTime<Utc>>> {
        self.sent_date.clone()
    }

    fn received_date(&self) -> FieldResult<Option<DateTime<Utc>>> {
        self.received_date.clone()
    }

    fn in_reply_to(&self) -> FieldResult<Option<String>> {
        Ok(self.in_reply_to.clone())
    }

    fn references(&self) -> FieldResult<Vec<String>> {
        Ok(self.references.clone())
    }

    fn bodies(&self) -> FieldResult<BodyVariants> {
        Ok(self.bodies.clone())
    }

    fn attachments(&self) -> FieldResult<Vec<AttachmentDescriptor>> {
        match &self.structure_warning {
            Some(warning) => Err(warning.clone()),
            None => Ok(self.attachments.clone()),
        }
    }

    fn raw_headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }

    fn native_content(&self) -> Option<Vec<u8>> {
        Some(self.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_bytes() {
        let source = StoreSource::bytes(
            "eml",
            b"From: a@example.org\nSubject: Note\n\nText\n".to_vec(),
        );
        let mut folder = EmlReader.open(&source).unwrap();
        assert_eq!(folder.name(), "message");
        assert!(folder.has_elements());
        assert!(!folder.has_subfolders());
        let mut subjects = Vec::new();
        folder
            .for_each_element(&mut |element| {
                subjects.push(element.subject().unwrap());
                assert!(element.native_content().unwrap().starts_with(b"From: a@"));
                Ok(())
            })
            .unwrap();
        assert_eq!(subjects, vec![Some("Note".to_string())]);
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.eml");
        std::fs::write(&path, b"Subject: Hi\n\nbody\n").unwrap();
        let folder = EmlReader.open(&StoreSource::path("eml", &path)).unwrap();
        assert_eq!(folder.name(), "letter");
    }

    #[test]
    fn test_missing_file() {
        let err = EmlReader
            .open(&StoreSource::path("eml", "/nonexistent/mailpack/x.eml"))
            .err()
            .unwrap();
        assert!(matches!(err, PackError::StructuralAccess { .. }));
    }
}
