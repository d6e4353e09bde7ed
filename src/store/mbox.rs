//! Single MBOX file store.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{PackError, Result};
use crate::parser::mbox::MboxParser;
use crate::parser::mime::parse_message;

use super::eml::file_stem;
use super::{NativeElement, NativeFolder, StoreReader, StoreSource};

/// Reader for one MBOX file; the file is its only folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MboxReader;

impl StoreReader for MboxReader {
    fn open(&self, source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
        let path = source
            .path
            .as_ref()
            .ok_or_else(|| PackError::access(source.describe(), "mbox stores need a file path"))?;
        Ok(Box::new(MboxFolder::open(path.clone())?))
    }

    fn needs_file(&self) -> bool {
        true
    }
}

/// The messages of one MBOX file.
pub struct MboxFolder {
    name: String,
    parser: MboxParser,
}

impl MboxFolder {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parser = MboxParser::new(&path)?;
        Ok(Self {
            name: file_stem(&path),
            parser,
        })
    }

    pub(crate) fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl NativeFolder for MboxFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_elements(&self) -> bool {
        self.parser.file_size() > 0
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
        let mut failure = None;
        let count = self.parser.parse(&mut |offset, bytes| {
            let message = parse_message(bytes);
            match visit(&message) {
                Ok(()) => true,
                Err(e) => {
                    debug!(offset, error = %e, "Stopping mbox walk");
                    failure = Some(e);
                    false
                }
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => {
                debug!(path = %self.parser.path().display(), messages = count, "Finished mbox walk");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MESSAGES: &[u8] = b"From a@example.org Mon Jan  1 00:00:00 2024\n\
Subject: first\nMessage-ID: <1@example.org>\n\none\n\n\
From b@example.org Mon Jan  1 00:00:00 2024\n\
Subject: second\nMessage-ID: <2@example.org>\n\ntwo\n";

    #[test]
    fn test_walk_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Inbox");
        std::fs::write(&path, TWO_MESSAGES).unwrap();

        let mut folder = MboxReader.open(&StoreSource::path("mbox", &path)).unwrap();
        assert_eq!(folder.name(), "Inbox");
        assert!(folder.has_elements());
        let mut ids = Vec::new();
        folder
            .for_each_element(&mut |element| {
                ids.push(element.message_id().unwrap().unwrap());
                Ok(())
            })
            .unwrap();
        assert_eq!(ids, vec!["<1@example.org>", "<2@example.org>"]);
    }

    #[test]
    fn test_visit_error_stops_walk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Inbox");
        std::fs::write(&path, TWO_MESSAGES).unwrap();

        let mut folder = MboxReader.open(&StoreSource::path("mbox", &path)).unwrap();
        let mut seen = 0;
        let err = folder
            .for_each_element(&mut |_| {
                seen += 1;
                Err(PackError::Cancelled)
            })
            .unwrap_err();
        assert!(matches!(err, PackError::Cancelled));
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_needs_path() {
        let err = MboxReader
            .open(&StoreSource::bytes("mbox", b"From x\n".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, PackError::StructuralAccess { .. }));
        assert!(MboxReader.needs_file());
    }
}
