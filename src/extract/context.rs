//! Per-job (or per nested container) extraction state.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::archive::metadata::MetadataTree;
use crate::archive::naming::{self, NodeKind};
use crate::archive::node::{ArchiveNode, NodeSettings};
use crate::error::{PackError, Result};
use crate::model::attachment::AttachmentDescriptor;
use crate::model::date_range::DateRange;
use crate::model::stats::ExtractionStats;
use crate::store::{NativeFolder, StoreSource};

use super::folder::{date_range_metadata, FolderNode};
use super::options::ExtractionOptions;
use super::progress::{CancelToken, NoProgress, ProgressEvent, ProgressSink};
use super::registry::{SchemeEntry, SchemeRegistry};

/// File stem of the package manifest written at the package root.
pub const MANIFEST_STEM: &str = "__package__";

/// Monotonic id counter shared by a root context and all of its nested contexts.
#[derive(Debug, Clone)]
pub struct UniqueIdSource(Arc<AtomicU64>);

impl UniqueIdSource {
    pub fn starting_at(first: u64) -> Self {
        Self(Arc::new(AtomicU64::new(first)))
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Identity, options and running counters of one extraction.
///
/// A root context is created per job; [`new_nested`](Self::new_nested)
/// creates one per container attachment. Nested contexts share the root's
/// options, registry, id counter, progress sink and cancellation token.
pub struct ExtractionContext {
    source: StoreSource,
    root_path: PathBuf,
    options: Arc<ExtractionOptions>,
    registry: Arc<SchemeRegistry>,
    ids: UniqueIdSource,
    stats: ExtractionStats,
    date_range: DateRange,
    /// 0 for the job itself, n for a container nested n levels deep.
    depth: usize,
    root: Option<Box<dyn NativeFolder>>,
    container_node: Option<ArchiveNode>,
    /// `root_path` is a directory of this context's own (a `Container` node).
    owns_root_dir: bool,
    temp_file: Option<NamedTempFile>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl ExtractionContext {
    /// Open `source` for a job whose package goes to `{destination}/{name}`.
    pub fn new_root(
        source: StoreSource,
        destination: impl AsRef<Path>,
        name: impl AsRef<str>,
        options: ExtractionOptions,
        registry: Arc<SchemeRegistry>,
    ) -> Result<Self> {
        let entry = registry.get(&source.scheme).ok_or_else(|| {
            PackError::access(
                source.describe(),
                format!("no reader registered for scheme '{}'", source.scheme),
            )
        })?;
        let root = open_root(entry, &source)?;
        let root_path = destination.as_ref().join(name.as_ref());
        info!(
            source = %source.describe(),
            package = %root_path.display(),
            "Opened extraction source"
        );
        Ok(Self {
            source,
            root_path,
            ids: UniqueIdSource::starting_at(options.first_unique_id),
            options: Arc::new(options),
            registry,
            stats: ExtractionStats::default(),
            date_range: DateRange::new(),
            depth: 0,
            root: Some(root),
            container_node: None,
            owns_root_dir: false,
            temp_file: None,
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Context for the store carried by a container attachment.
    ///
    /// The nested package lands under `parent_dir`, inside its own
    /// `Container` node when the scheme is registered as a container.
    pub fn new_nested(
        &self,
        attachment: &AttachmentDescriptor,
        parent_dir: &Path,
        index: usize,
    ) -> Result<Self> {
        self.cancel.check()?;
        let depth = self.depth + 1;
        if depth > self.options.max_nesting_depth {
            return Err(PackError::DepthExceeded(self.options.max_nesting_depth));
        }
        let scheme = attachment
            .scheme
            .as_deref()
            .ok_or_else(|| PackError::UnsupportedContainer("(none)".to_string()))?;
        let entry = self
            .registry
            .get(scheme)
            .ok_or_else(|| PackError::UnsupportedContainer(scheme.to_string()))?;

        let (source, temp_file) = if entry.needs_file() {
            let temp = materialize(&attachment.content)?;
            (StoreSource::path(&entry.scheme, temp.path()), Some(temp))
        } else {
            (
                StoreSource::bytes(&entry.scheme, attachment.content.clone()),
                None,
            )
        };
        let root = open_root(entry, &source)?;

        let display_name = attachment.display_name(index);
        let (root_path, container_node) = if entry.container {
            let dir = parent_dir.join(self.node_dir_name(NodeKind::Container, &display_name, false));
            let mut node = ArchiveNode::new(dir.clone(), NodeKind::Container, self.node_settings());
            node.add_metadata("Name", Some(display_name), true);
            node.add_metadata("Scheme", Some(entry.scheme.as_str()), true);
            node.add_metadata("MimeType", attachment.media_type.as_deref(), false);
            node.add_metadata("Size", Some(attachment.content.len().to_string()), false);
            (dir, Some(node))
        } else {
            (parent_dir.to_path_buf(), None)
        };

        debug!(scheme = %entry.scheme, depth, "Opened nested container");
        Ok(Self {
            source,
            root_path,
            options: Arc::clone(&self.options),
            registry: Arc::clone(&self.registry),
            ids: self.ids.clone(),
            stats: ExtractionStats::default(),
            date_range: DateRange::new(),
            depth,
            root: Some(root),
            owns_root_dir: container_node.is_some(),
            container_node,
            temp_file,
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
        })
    }

    /// Extract the whole store, then write the root's own metadata.
    ///
    /// Statistics are kept current while running, so [`stats`](Self::stats)
    /// reflects the work done even when this fails.
    pub fn run(&mut self) -> Result<ExtractionStats> {
        let mut root = self.take_root()?;
        if self.depth > 0 {
            self.emit(ProgressEvent::ContainerStarted {
                scheme: self.source.scheme.clone(),
                depth: self.depth,
            });
        }
        let root_path = self.root_path.clone();
        let folder = FolderNode::extract(self, root.as_mut(), &root_path, 0)?;
        self.date_range.merge(folder.date_range());

        if self.depth == 0 {
            self.write_package(&folder)?;
        } else {
            if let Some(mut node) = self.container_node.take() {
                node.add_group("DateRange", date_range_metadata(&self.date_range));
                node.add_group("Statistics", stats_metadata(&self.stats));
                node.write()?;
            }
            self.emit(ProgressEvent::ContainerFinished {
                scheme: self.source.scheme.clone(),
                depth: self.depth,
                elements: self.stats.elements,
            });
        }
        Ok(self.stats)
    }

    /// Hand the opened root folder over to a traversal. Possible once.
    pub(crate) fn take_root(&mut self) -> Result<Box<dyn NativeFolder>> {
        self.root
            .take()
            .ok_or_else(|| PackError::access(self.source.describe(), "store root already consumed"))
    }

    /// Root folder node at the package root, then the manifest.
    fn write_package(&self, folder: &FolderNode) -> Result<()> {
        let title = self
            .options
            .package_title
            .clone()
            .unwrap_or_else(|| folder.name().to_string());

        let mut root = ArchiveNode::new(self.root_path.clone(), NodeKind::Folder, self.node_settings());
        root.add_metadata("Title", Some(title.as_str()), true);
        root.add_metadata("Level", Some("0"), false);
        root.add_group("DateRange", date_range_metadata(&self.date_range));
        root.add_group("Statistics", stats_metadata(&self.stats));
        root.write()?;

        let mut manifest = MetadataTree::new();
        manifest.push_text("Generator", env!("CARGO_PKG_NAME"));
        manifest.push_text("GeneratorVersion", env!("CARGO_PKG_VERSION"));
        manifest.push_text(
            "Created",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        manifest.push_text("Source", self.source.describe());
        manifest.push_text("Title", title);
        manifest.push_text("MetadataFormat", self.options.metadata_format.extension());
        let range = date_range_metadata(&self.date_range);
        if !range.is_empty() {
            manifest.push_group("DateRange", range);
        }
        manifest.push_group("Statistics", stats_metadata(&self.stats));

        let format = self.options.metadata_format;
        let path = self
            .root_path
            .join(format!("{MANIFEST_STEM}.{}", format.extension()));
        std::fs::write(&path, format.serialize("Package", &manifest))
            .map_err(|e| PackError::write(&path, e))?;
        info!(package = %self.root_path.display(), "Package complete");
        Ok(())
    }

    /// Release the temporary file of a nested container. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if let Some(temp) = self.temp_file.take() {
            let path = temp.path().to_path_buf();
            temp.close()
                .map_err(|source| PackError::Resource { path, source })?;
        }
        Ok(())
    }

    /// Remove everything a failed nested extraction wrote to its own node.
    ///
    /// Nested stores without a `Container` node write into the parent's
    /// directory and are left alone.
    pub fn discard_output(&mut self) -> Result<()> {
        self.container_node = None;
        if self.owns_root_dir && self.root_path.exists() {
            std::fs::remove_dir_all(&self.root_path)
                .map_err(|e| PackError::write(&self.root_path, e))?;
            debug!(dir = %self.root_path.display(), "Removed partial container");
        }
        Ok(())
    }

    pub fn next_unique_id(&self) -> u64 {
        self.ids.next_id()
    }

    pub fn add_stats(&mut self, folders: u64, elements: u64, raw_size: u64, attached: u64) {
        self.stats.add(folders, elements, raw_size, attached);
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            stats: self.stats,
            date_range: self.date_range,
        }
    }

    /// Forget the counts and dates gathered since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.stats = checkpoint.stats;
        self.date_range = checkpoint.date_range;
    }

    /// Fold a finished (or failed) nested extraction into this one.
    pub fn absorb_nested(&mut self, nested: &ExtractionContext) {
        self.stats.attached_elements += nested.stats.nested_contribution();
        self.date_range.merge(&nested.date_range);
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    pub fn source(&self) -> &StoreSource {
        &self.source
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Directory under which the root folder's children are written.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn node_settings(&self) -> NodeSettings {
        self.options.node_settings()
    }

    /// A fresh unique node directory name.
    pub fn node_dir_name(&self, kind: NodeKind, raw_name: &str, object_bearing: bool) -> String {
        naming::node_dir_name(
            kind,
            self.next_unique_id(),
            raw_name,
            object_bearing,
            self.options.compact_naming,
            self.options.name_length.max(1),
        )
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.progress.on_event(&event);
    }
}

/// Counters saved before a subtree that may be skipped.
pub(crate) struct Checkpoint {
    stats: ExtractionStats,
    date_range: DateRange,
}

impl Drop for ExtractionContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "Failed to remove temporary container file");
        }
    }
}

fn open_root(entry: &SchemeEntry, source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
    entry.reader.open(source).map_err(|e| match e {
        PackError::StructuralAccess { .. } | PackError::Cancelled => e,
        other => PackError::access(source.describe(), other),
    })
}

/// Write nested content to a temporary file for readers that need one.
fn materialize(content: &[u8]) -> Result<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix("mailpack-")
        .tempfile()
        .map_err(|source| PackError::Resource {
            path: std::env::temp_dir(),
            source,
        })?;
    let path = temp.path().to_path_buf();
    temp.write_all(content)
        .and_then(|()| temp.flush())
        .map_err(|source| PackError::Resource { path, source })?;
    Ok(temp)
}

pub(crate) fn stats_metadata(stats: &ExtractionStats) -> MetadataTree {
    let mut tree = MetadataTree::new();
    tree.push_text("Folders", stats.folders.to_string());
    tree.push_text("Elements", stats.elements.to_string());
    tree.push_text("RawSize", stats.raw_size.to_string());
    tree.push_text("AttachedElements", stats.attached_elements.to_string());
    tree
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::memory::{MemoryFolder, MemoryMessage, MemoryReader};
    use crate::store::{NativeElement, StoreReader};

    /// File-backed store that yields one message and then fails.
    struct TruncatedReader {
        opened: Arc<Mutex<Option<PathBuf>>>,
    }

    impl StoreReader for TruncatedReader {
        fn open(&self, source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
            *self.opened.lock().unwrap() = source.path.clone();
            Ok(Box::new(TruncatedFolder {
                message: MemoryMessage::new("survivor").with_text("body"),
            }))
        }

        fn needs_file(&self) -> bool {
            true
        }
    }

    struct TruncatedFolder {
        message: MemoryMessage,
    }

    impl NativeFolder for TruncatedFolder {
        fn name(&self) -> &str {
            "truncated"
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
            visit(&self.message)?;
            Err(PackError::access("truncated", "unexpected end of store"))
        }
    }

    fn memory_registry(root: MemoryFolder) -> Arc<SchemeRegistry> {
        let mut registry = SchemeRegistry::with_defaults();
        registry.register(SchemeEntry::new("memory", MemoryReader::new(root)));
        Arc::new(registry)
    }

    #[test]
    fn test_unique_ids_are_shared() {
        let ids = UniqueIdSource::starting_at(5);
        let other = ids.clone();
        assert_eq!(ids.next_id(), 5);
        assert_eq!(other.next_id(), 6);
        assert_eq!(ids.next_id(), 7);
    }

    #[test]
    fn test_unknown_scheme_is_structural() {
        let err = ExtractionContext::new_root(
            StoreSource::path("pst", "/x.pst"),
            "/tmp",
            "x",
            ExtractionOptions::default(),
            Arc::new(SchemeRegistry::with_defaults()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PackError::StructuralAccess { .. }));
    }

    #[test]
    fn test_nested_guards() {
        let dest = tempfile::tempdir().unwrap();
        let options = ExtractionOptions {
            max_nesting_depth: 0,
            ..Default::default()
        };
        let ctx = ExtractionContext::new_root(
            StoreSource::path("memory", "mem"),
            dest.path(),
            "pkg",
            options,
            memory_registry(MemoryFolder::new("root")),
        )
        .unwrap();
        let attachment = AttachmentDescriptor::file("x.mbox", b"From a\n".to_vec()).with_scheme("mbox");
        let err = ctx.new_nested(&attachment, dest.path(), 0).err().unwrap();
        assert!(matches!(err, PackError::DepthExceeded(0)));

        let ctx = ExtractionContext::new_root(
            StoreSource::path("memory", "mem"),
            dest.path(),
            "pkg",
            ExtractionOptions::default(),
            memory_registry(MemoryFolder::new("root")),
        )
        .unwrap();
        let unknown = AttachmentDescriptor::file("x.pst", vec![0]).with_scheme("pst");
        let err = ctx.new_nested(&unknown, dest.path(), 0).err().unwrap();
        assert!(matches!(err, PackError::UnsupportedContainer(s) if s == "pst"));
    }

    #[test]
    fn test_nested_temp_file_is_released() {
        let dest = tempfile::tempdir().unwrap();
        let ctx = ExtractionContext::new_root(
            StoreSource::path("memory", "mem"),
            dest.path(),
            "pkg",
            ExtractionOptions::default(),
            memory_registry(MemoryFolder::new("root")),
        )
        .unwrap();
        let attachment = AttachmentDescriptor::file(
            "old.mbox",
            b"From a@b Mon Jan  1 00:00:00 2024\nSubject: x\n\nbody\n".to_vec(),
        )
        .with_scheme("mbox");
        let mut nested = ctx.new_nested(&attachment, dest.path(), 0).unwrap();
        let temp_path = nested.temp_file.as_ref().unwrap().path().to_path_buf();
        assert!(temp_path.exists());
        assert_eq!(nested.depth(), 1);
        nested.close().unwrap();
        nested.close().unwrap();
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_failed_nested_run_cleans_up() {
        let dest = tempfile::tempdir().unwrap();
        let opened = Arc::new(Mutex::new(None));
        let mut registry = SchemeRegistry::with_defaults();
        registry.register(SchemeEntry::new("memory", MemoryReader::new(MemoryFolder::new("root"))));
        registry.register(
            SchemeEntry::new(
                "truncated",
                TruncatedReader {
                    opened: Arc::clone(&opened),
                },
            )
            .as_container(),
        );
        let ctx = ExtractionContext::new_root(
            StoreSource::path("memory", "mem"),
            dest.path(),
            "pkg",
            ExtractionOptions::default(),
            Arc::new(registry),
        )
        .unwrap();
        let attachment =
            AttachmentDescriptor::file("old.box", b"payload".to_vec()).with_scheme("truncated");
        let mut nested = ctx.new_nested(&attachment, dest.path(), 0).unwrap();
        let container_dir = nested.root_path().to_path_buf();

        assert!(nested.run().is_err());
        assert!(container_dir.exists());
        let temp_path = opened.lock().unwrap().clone().unwrap();
        assert!(temp_path.exists());

        nested.close().unwrap();
        assert!(!temp_path.exists());
        nested.discard_output().unwrap();
        assert!(!container_dir.exists());
    }
}
