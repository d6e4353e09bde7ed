//! A node of the output package: one directory with a metadata document and,
//! for object-bearing nodes, typed payload files.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{PackError, Result, WarningLevel};

use super::metadata::{MetadataFormat, MetadataTree};
use super::naming::{self, NodeKind};

/// File stem of every node's metadata document.
pub const METADATA_STEM: &str = "__metadata__";

/// Role of a payload file inside its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadUsage {
    /// The original bytes of the object.
    BinaryMaster,
    /// Plain text extracted from the object.
    TextContent,
}

impl PayloadUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BinaryMaster => "BinaryMaster",
            Self::TextContent => "TextContent",
        }
    }
}

/// Serialization settings shared by every node of a job.
#[derive(Debug, Clone, Copy)]
pub struct NodeSettings {
    pub format: MetadataFormat,
    pub name_length: usize,
    pub warning_level: WarningLevel,
}

#[derive(Debug)]
struct Payload {
    file_name: String,
    content: Vec<u8>,
}

/// Builder for one package node.
///
/// Metadata and payloads are collected in memory; [`ArchiveNode::write`]
/// puts them on disk, once.
#[derive(Debug)]
pub struct ArchiveNode {
    dir: PathBuf,
    kind: NodeKind,
    metadata: MetadataTree,
    payloads: Vec<Payload>,
    settings: NodeSettings,
    written: bool,
}

impl ArchiveNode {
    /// A node stored in `dir` (the final, already unique directory path).
    pub fn new(dir: PathBuf, kind: NodeKind, settings: NodeSettings) -> Self {
        Self {
            dir,
            kind,
            metadata: MetadataTree::new(),
            payloads: Vec::new(),
            settings,
            written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn metadata(&self) -> &MetadataTree {
        &self.metadata
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Append `key = value`. Empty values are omitted; omitting a mandatory
    /// one is logged.
    pub fn add_metadata<S: Into<String>>(&mut self, key: &str, value: Option<S>, mandatory: bool) {
        match value.map(Into::into).filter(|v| !v.trim().is_empty()) {
            Some(v) => self.metadata.push_text(key, v),
            None if mandatory => self.settings.warning_level.report(
                &self.dir.display().to_string(),
                &format!("mandatory metadata '{key}' is missing"),
            ),
            None => {}
        }
    }

    /// Append one entry per non-empty value under the same key.
    pub fn add_repeated_metadata<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_metadata(key, Some(value), false);
        }
    }

    /// Append a nested group; empty groups are omitted.
    pub fn add_group(&mut self, key: &str, group: MetadataTree) {
        if !group.is_empty() {
            self.metadata.push_group(key, group);
        }
    }

    /// Attach a payload file and record it as a `DataObject` metadata group.
    pub fn add_payload(
        &mut self,
        content: Vec<u8>,
        filename: &str,
        usage: PayloadUsage,
        version: u32,
        media_type: Option<&str>,
    ) {
        let file_name =
            naming::payload_file_name(usage.as_str(), version, filename, self.settings.name_length);
        let digest = Sha256::digest(&content);

        let mut object = MetadataTree::new();
        object.push_text("Usage", usage.as_str());
        object.push_text("Version", version.to_string());
        object.push_text("Filename", file_name.clone());
        object.push_text("Size", content.len().to_string());
        if let Some(media_type) = media_type.filter(|m| !m.is_empty()) {
            object.push_text("MimeType", media_type);
        }
        object.push_text("MessageDigest", format!("{digest:x}"));
        self.metadata.push_group("DataObject", object);

        self.payloads.push(Payload { file_name, content });
    }

    pub fn has_payloads(&self) -> bool {
        !self.payloads.is_empty()
    }

    /// Create the directory, then write the metadata document and payloads.
    ///
    /// A node is written at most once; payload memory is released afterwards.
    pub fn write(&mut self) -> Result<()> {
        if self.written {
            return Err(PackError::write(
                &self.dir,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "archive node already written",
                ),
            ));
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| PackError::write(&self.dir, e))?;

        let format = self.settings.format;
        let doc_path = self
            .dir
            .join(format!("{METADATA_STEM}.{}", format.extension()));
        let document = format.serialize(self.kind.label(), &self.metadata);
        std::fs::write(&doc_path, document).map_err(|e| PackError::write(&doc_path, e))?;

        for payload in self.payloads.drain(..) {
            let path = self.dir.join(&payload.file_name);
            std::fs::write(&path, &payload.content).map_err(|e| PackError::write(&path, e))?;
        }

        self.written = true;
        debug!(path = %self.dir.display(), "Wrote archive node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(format: MetadataFormat) -> NodeSettings {
        NodeSettings {
            format,
            name_length: 32,
            warning_level: WarningLevel::Detail,
        }
    }

    #[test]
    fn test_metadata_omits_empty_values() {
        let mut node = ArchiveNode::new(
            PathBuf::from("/unused"),
            NodeKind::Message,
            settings(MetadataFormat::Json),
        );
        node.add_metadata("Subject", Some("Hello"), true);
        node.add_metadata("Comment", Some("  "), false);
        node.add_metadata::<String>("MessageID", None, true);
        node.add_repeated_metadata("To", ["a@x.org", "", "b@x.org"]);
        let tree = node.metadata();
        assert_eq!(tree.get_text("Subject"), Some("Hello"));
        assert_eq!(tree.get("Comment"), None);
        assert_eq!(tree.get("MessageID"), None);
        assert_eq!(tree.get_all("To").count(), 2);
    }

    #[test]
    fn test_write_node_with_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("__Body#3_Hello__");
        let mut node = ArchiveNode::new(dir.clone(), NodeKind::Body, settings(MetadataFormat::Json));
        node.add_payload(
            b"abc".to_vec(),
            "message.eml",
            PayloadUsage::BinaryMaster,
            1,
            Some("message/rfc822"),
        );
        node.write().unwrap();
        assert!(node.is_written());

        let payload = std::fs::read(dir.join("BinaryMaster_1_message.eml")).unwrap();
        assert_eq!(payload, b"abc");
        let doc = std::fs::read_to_string(dir.join("__metadata__.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
        let object = &value["Body"]["DataObject"];
        assert_eq!(object["Size"], "3");
        assert_eq!(object["MimeType"], "message/rfc822");
        assert_eq!(
            object["MessageDigest"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_second_write_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = ArchiveNode::new(
            tmp.path().join("Folder#1_x"),
            NodeKind::Folder,
            settings(MetadataFormat::Xml),
        );
        node.write().unwrap();
        assert!(tmp.path().join("Folder#1_x/__metadata__.xml").is_file());
        let err = node.write().unwrap_err();
        assert!(matches!(err, PackError::Write { .. }));
    }
}
