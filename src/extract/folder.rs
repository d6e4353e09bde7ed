//! Recursive folder traversal with empty-folder retention.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::archive::metadata::MetadataTree;
use crate::archive::naming::NodeKind;
use crate::archive::node::ArchiveNode;
use crate::error::{PackError, Result};
use crate::model::date_range::DateRange;
use crate::store::NativeFolder;

use super::context::ExtractionContext;
use super::element::MessageElement;
use super::progress::ProgressEvent;

/// Outcome of extracting one folder subtree.
///
/// Counts cover the whole subtree, dropped subfolders included.
#[derive(Debug, Clone, Default)]
pub struct FolderNode {
    name: String,
    level: usize,
    dir: PathBuf,
    date_range: DateRange,
    element_count: u64,
    subfolder_count: u64,
    raw_size: u64,
    retained: bool,
}

impl FolderNode {
    /// Extract `folder` and its subtree below `parent_dir`.
    ///
    /// Level 0 is the extraction root: it gets no node of its own, its
    /// messages and subfolders go straight into `parent_dir`. Failures inside
    /// a subfolder skip that subtree unless they are job-fatal; a skipped
    /// subtree leaves neither directories nor counts behind.
    pub fn extract(
        ctx: &mut ExtractionContext,
        folder: &mut dyn NativeFolder,
        parent_dir: &Path,
        level: usize,
    ) -> Result<FolderNode> {
        ctx.check_cancelled()?;
        let name = folder.name().to_string();
        if level == 0 {
            return Self::extract_into(ctx, folder, name, parent_dir.to_path_buf(), 0);
        }

        let checkpoint = ctx.checkpoint();
        ctx.add_stats(1, 0, 0, 0);
        let dir = parent_dir.join(ctx.node_dir_name(NodeKind::Folder, &name, false));
        match Self::extract_into(ctx, folder, name, dir.clone(), level) {
            Err(e) if !e.is_job_fatal() => {
                ctx.rollback(checkpoint);
                remove_partial(&dir)?;
                Err(e)
            }
            other => other,
        }
    }

    fn extract_into(
        ctx: &mut ExtractionContext,
        folder: &mut dyn NativeFolder,
        name: String,
        dir: PathBuf,
        level: usize,
    ) -> Result<FolderNode> {
        ctx.emit(ProgressEvent::FolderStarted {
            name: name.clone(),
            level,
        });

        let mut node = FolderNode {
            name,
            level,
            dir,
            ..Default::default()
        };

        if folder.has_elements() {
            folder.for_each_element(&mut |element| {
                ctx.check_cancelled()?;
                let message = MessageElement::analyze(element, ctx.options().warning_level);
                let outcome = message.extract(ctx, &node.dir)?;
                ctx.add_stats(0, 1, outcome.size, 0);
                node.element_count += 1;
                node.raw_size += outcome.size;
                node.date_range.extend(outcome.sent_date);
                Ok(())
            })?;
        }

        if folder.has_subfolders() {
            folder.for_each_subfolder(&mut |opened| {
                let extracted = opened
                    .and_then(|sub| FolderNode::extract(ctx, sub, &node.dir, level + 1));
                match extracted {
                    Ok(child) => {
                        node.absorb(&child);
                        Ok(())
                    }
                    Err(e) if e.is_job_fatal() => Err(e),
                    Err(e) => {
                        error!(parent = %node.name, error = %e, "Skipping unreadable folder");
                        Ok(())
                    }
                }
            })?;
        }

        node.retained = level == 0
            || node.element_count + node.subfolder_count > 0
            || !ctx.options().drops_empty_folder(level);
        if level > 0 {
            if node.retained {
                node.write(ctx)?;
            } else {
                debug!(folder = %node.name, level, "Dropping empty folder");
            }
        }

        ctx.emit(ProgressEvent::FolderFinished {
            name: node.name.clone(),
            level,
            elements: node.element_count,
            retained: node.retained,
        });
        Ok(node)
    }

    fn absorb(&mut self, child: &FolderNode) {
        self.subfolder_count += 1 + child.subfolder_count;
        self.element_count += child.element_count;
        self.raw_size += child.raw_size;
        self.date_range.merge(&child.date_range);
    }

    fn write(&self, ctx: &ExtractionContext) -> Result<()> {
        let mut archive = ArchiveNode::new(self.dir.clone(), NodeKind::Folder, ctx.node_settings());
        archive.add_metadata("Title", Some(self.name.as_str()), true);
        archive.add_metadata("Level", Some(self.level.to_string()), false);
        archive.add_group("DateRange", date_range_metadata(&self.date_range));
        archive.add_metadata("ElementCount", Some(self.element_count.to_string()), false);
        archive.add_metadata("SubFolderCount", Some(self.subfolder_count.to_string()), false);
        archive.add_metadata("RawSize", Some(self.raw_size.to_string()), false);
        archive.write()
    }

    /// Collect folder summaries in pre-order without writing anything.
    pub(crate) fn list(
        ctx: &ExtractionContext,
        folder: &mut dyn NativeFolder,
        parent_path: &str,
        level: usize,
        with_stats: bool,
        out: &mut Vec<FolderSummary>,
    ) -> Result<()> {
        ctx.check_cancelled()?;
        let name = folder.name().to_string();
        let path = match (level, parent_path.is_empty()) {
            (0, _) => String::new(),
            (_, true) => name.clone(),
            (_, false) => format!("{parent_path}/{name}"),
        };
        let index = out.len();
        out.push(FolderSummary {
            name,
            path: path.clone(),
            level,
            has_elements: folder.has_elements(),
            subfolders: 0,
            element_count: None,
            raw_size: None,
            date_range: None,
        });

        if with_stats {
            let mut count = 0u64;
            let mut size = 0u64;
            let mut range = DateRange::new();
            if folder.has_elements() {
                folder.for_each_element(&mut |element| {
                    ctx.check_cancelled()?;
                    count += 1;
                    size += element.native_content().map_or(0, |c| c.len() as u64);
                    range.extend(element.sent_date().ok().flatten());
                    Ok(())
                })?;
            }
            let summary = &mut out[index];
            summary.element_count = Some(count);
            summary.raw_size = Some(size);
            summary.date_range = Some(range);
        }

        let mut subfolders = 0;
        if folder.has_subfolders() {
            folder.for_each_subfolder(&mut |opened| match opened {
                Ok(sub) => {
                    subfolders += 1;
                    Self::list(ctx, sub, &path, level + 1, with_stats, out)
                }
                Err(e) if e.is_job_fatal() => Err(e),
                Err(e) => {
                    warn!(parent = %path, error = %e, "Skipping unreadable folder");
                    Ok(())
                }
            })?;
        }
        out[index].subfolders = subfolders;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    pub fn subfolder_count(&self) -> u64 {
        self.subfolder_count
    }

    pub fn raw_size(&self) -> u64 {
        self.raw_size
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }
}

/// Remove what a failed subtree left on disk.
fn remove_partial(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| PackError::write(dir, e))?;
        debug!(dir = %dir.display(), "Removed partial folder");
    }
    Ok(())
}

/// One folder of a store listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderSummary {
    pub name: String,
    /// Slash-separated path below the root; empty for the root itself.
    pub path: String,
    pub level: usize,
    pub has_elements: bool,
    /// Number of direct subfolders.
    pub subfolders: usize,
    /// Direct messages; only filled when statistics were requested.
    pub element_count: Option<u64>,
    pub raw_size: Option<u64>,
    pub date_range: Option<DateRange>,
}

/// `Start`/`End` entries of a date range, empty when undefined.
pub(crate) fn date_range_metadata(range: &DateRange) -> MetadataTree {
    let mut tree = MetadataTree::new();
    if let (Some(start), Some(end)) = (range.start(), range.end()) {
        tree.push_text("Start", start.to_rfc3339_opts(SecondsFormat::Secs, true));
        tree.push_text("End", end.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    tree
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::extract::options::ExtractionOptions;
    use crate::extract::registry::{SchemeEntry, SchemeRegistry};
    use crate::store::memory::{MemoryFolder, MemoryMessage, MemoryReader};
    use crate::store::StoreSource;

    fn context(root: MemoryFolder, dest: &Path, options: ExtractionOptions) -> ExtractionContext {
        let mut registry = SchemeRegistry::with_defaults();
        registry.register(SchemeEntry::new("memory", MemoryReader::new(root)));
        ExtractionContext::new_root(
            StoreSource::path("memory", "mem"),
            dest,
            "pkg",
            options,
            Arc::new(registry),
        )
        .unwrap()
    }

    fn dated(subject: &str, day: u32) -> MemoryMessage {
        MemoryMessage::new(subject)
            .with_text("body")
            .with_date(Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_subtree_counts_and_range() {
        let dest = tempfile::tempdir().unwrap();
        let root = MemoryFolder::new("root").with_subfolder(
            MemoryFolder::new("A")
                .with_message(dated("one", 3))
                .with_subfolder(MemoryFolder::new("B").with_message(dated("two", 1)))
                .with_subfolder(MemoryFolder::new("C")),
        );
        let mut ctx = context(root, dest.path(), ExtractionOptions::default());
        let mut folder = ctx.take_root().unwrap();
        let root_path = ctx.root_path().to_path_buf();
        let node = FolderNode::extract(&mut ctx, folder.as_mut(), &root_path, 0).unwrap();

        assert_eq!(node.element_count(), 2);
        assert_eq!(node.subfolder_count(), 3);
        assert_eq!(
            node.date_range().start(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            node.date_range().end(),
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap())
        );
        assert_eq!(ctx.stats().folders, 3);
        assert_eq!(ctx.stats().elements, 2);
    }

    #[test]
    fn test_list_is_pre_order() {
        let dest = tempfile::tempdir().unwrap();
        let root = MemoryFolder::new("root")
            .with_subfolder(
                MemoryFolder::new("Inbox")
                    .with_message(dated("a", 2))
                    .with_subfolder(MemoryFolder::new("Lists")),
            )
            .with_subfolder(MemoryFolder::new("Sent"));
        let mut ctx = context(root, dest.path(), ExtractionOptions::default());
        let mut folder = ctx.take_root().unwrap();
        let mut out = Vec::new();
        FolderNode::list(&ctx, folder.as_mut(), "", 0, true, &mut out).unwrap();

        let paths: Vec<&str> = out.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["", "Inbox", "Inbox/Lists", "Sent"]);
        assert_eq!(out[0].subfolders, 2);
        assert_eq!(out[1].element_count, Some(1));
        assert!(out[1].date_range.as_ref().unwrap().is_defined());
        assert!(!dest.path().join("pkg").exists());
    }

    #[test]
    fn test_date_range_metadata_is_utc() {
        let range = DateRange::at(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap());
        let tree = date_range_metadata(&range);
        assert_eq!(tree.get_text("Start"), Some("2024-05-06T07:08:09Z"));
        assert!(date_range_metadata(&DateRange::new()).is_empty());
    }
}
