//! Directory and file names of package nodes.
//!
//! Node directories are named `{Tag}#{id}_{name}`. Nodes that own payload
//! files are wrapped as `__{Tag}#{id}_{name}__`, so a reader of the package
//! can tell them from purely descriptive group nodes.

/// Marker wrapped around object-bearing node names.
pub const OBJECT_MARKER: &str = "__";

/// Name used when sanitation leaves nothing.
const UNNAMED: &str = "unnamed";

/// Longest extension kept intact when a payload filename is truncated.
const MAX_EXTENSION_LEN: usize = 10;

/// The kind of unit an archive node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Message,
    Body,
    Attachment,
    Container,
}

impl NodeKind {
    pub fn tag(&self, compact: bool) -> &'static str {
        match (self, compact) {
            (Self::Folder, false) => "Folder",
            (Self::Message, false) => "Message",
            (Self::Body, false) => "Body",
            (Self::Attachment, false) => "Attachment",
            (Self::Container, false) => "Container",
            (Self::Folder, true) => "F",
            (Self::Message, true) => "M",
            (Self::Body, true) => "B",
            (Self::Attachment, true) => "A",
            (Self::Container, true) => "C",
        }
    }

    /// Root element name of the node's metadata document.
    pub fn label(&self) -> &'static str {
        self.tag(false)
    }
}

/// Reduce a free-form name to a portable file name component.
///
/// Keeps alphanumerics and `-._@`, maps everything else to `_`, collapses
/// runs of `_`, strips leading/trailing `_` and `.`, and truncates to
/// `max_len` characters.
pub fn sanitize(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_len.saturating_mul(4)));
    for c in raw.chars() {
        let mapped = if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@') {
            c
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    let truncated: String = trimmed.chars().take(max_len.max(1)).collect();
    let truncated = truncated.trim_end_matches(|c| c == '_' || c == '.');
    if truncated.is_empty() {
        UNNAMED.to_string()
    } else {
        truncated.to_string()
    }
}

/// Directory name of a node.
pub fn node_dir_name(
    kind: NodeKind,
    id: u64,
    raw_name: &str,
    object_bearing: bool,
    compact: bool,
    max_len: usize,
) -> String {
    let name = format!("{}#{}_{}", kind.tag(compact), id, sanitize(raw_name, max_len));
    if object_bearing {
        format!("{OBJECT_MARKER}{name}{OBJECT_MARKER}")
    } else {
        name
    }
}

/// Whether a directory name denotes an object-bearing node.
pub fn is_object_dir(name: &str) -> bool {
    name.len() > 2 * OBJECT_MARKER.len()
        && name.starts_with(OBJECT_MARKER)
        && name.ends_with(OBJECT_MARKER)
}

/// File name of a payload: `{usage}_{version}_{filename}`.
///
/// The filename is sanitized on its own; its extension survives truncation.
pub fn payload_file_name(usage: &str, version: u32, filename: &str, max_len: usize) -> String {
    format!("{usage}_{version}_{}", sanitize_keeping_extension(filename, max_len))
}

fn sanitize_keeping_extension(filename: &str, max_len: usize) -> String {
    let full = sanitize(filename, usize::MAX);
    if full.chars().count() <= max_len {
        return full;
    }
    match full.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().count() <= MAX_EXTENSION_LEN =>
        {
            let stem_len = max_len.saturating_sub(ext.chars().count() + 1).max(1);
            let stem: String = stem.chars().take(stem_len).collect();
            format!("{}.{ext}", stem.trim_end_matches('_'))
        }
        _ => sanitize(&full, max_len),
    }
}
