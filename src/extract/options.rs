//! Immutable options of one extraction job.

use serde::{Deserialize, Serialize};

use crate::archive::metadata::MetadataFormat;
use crate::archive::node::NodeSettings;
use crate::error::WarningLevel;

/// Options shared (read-only) by a job and all of its nested containers.
///
/// Deserializes from the `[extraction]` config section; missing keys take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    /// Drop folders with no messages and no subfolders, at any level.
    pub drop_empty_folders: bool,
    /// Drop such folders only directly below the extraction root.
    pub keep_only_deep_empty_folders: bool,
    /// Store extracted plain text next to bodies and attachments.
    pub extract_text: bool,
    /// One-letter node type tags.
    pub compact_naming: bool,
    /// Maximum length of the name part of node and payload names.
    pub name_length: usize,
    pub warning_level: WarningLevel,
    pub metadata_format: MetadataFormat,
    /// Nested containers deeper than this are kept as plain files.
    pub max_nesting_depth: usize,
    /// First value of the unique id counter.
    pub first_unique_id: u64,
    /// Package title; defaults to the source name.
    pub package_title: Option<String>,
    /// Record calendar data of appointment items.
    pub extract_appointments: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            drop_empty_folders: false,
            keep_only_deep_empty_folders: false,
            extract_text: false,
            compact_naming: false,
            name_length: 32,
            warning_level: WarningLevel::Detail,
            metadata_format: MetadataFormat::Json,
            max_nesting_depth: 16,
            first_unique_id: 1,
            package_title: None,
            extract_appointments: true,
        }
    }
}

impl ExtractionOptions {
    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            format: self.metadata_format,
            name_length: self.name_length.max(1),
            warning_level: self.warning_level,
        }
    }

    /// Whether an empty folder at `level` (relative to the extraction root) is dropped.
    pub fn drops_empty_folder(&self, level: usize) -> bool {
        self.drop_empty_folders || (self.keep_only_deep_empty_folders && level == 1)
    }
}
