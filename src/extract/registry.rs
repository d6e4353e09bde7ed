//! Scheme registry: which reader opens which kind of store.
//!
//! Built once, then shared read-only by every context of every job.

use std::sync::Arc;

use crate::content::{essence, ContentSniffer, MagicSniffer, PlainTextExtractor, TextExtractor};
use crate::store::eml::EmlReader;
use crate::store::mbox::MboxReader;
use crate::store::mboxdir::MboxDirReader;
use crate::store::StoreReader;

/// One registered store kind.
#[derive(Clone)]
pub struct SchemeEntry {
    pub scheme: String,
    /// Media types that identify this kind of store when sniffed.
    pub media_types: Vec<String>,
    pub reader: Arc<dyn StoreReader>,
    /// Nested extractions of this scheme get their own `Container` node.
    pub container: bool,
}

impl SchemeEntry {
    pub fn new(scheme: impl Into<String>, reader: impl StoreReader + 'static) -> Self {
        Self {
            scheme: scheme.into(),
            media_types: Vec::new(),
            reader: Arc::new(reader),
            container: false,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_types.push(media_type.into());
        self
    }

    pub fn as_container(mut self) -> Self {
        self.container = true;
        self
    }

    pub fn needs_file(&self) -> bool {
        self.reader.needs_file()
    }
}

impl std::fmt::Debug for SchemeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeEntry")
            .field("scheme", &self.scheme)
            .field("media_types", &self.media_types)
            .field("container", &self.container)
            .finish()
    }
}

/// Scheme → reader table plus the content services used during extraction.
#[derive(Clone)]
pub struct SchemeRegistry {
    entries: Vec<SchemeEntry>,
    sniffer: Arc<dyn ContentSniffer>,
    text_extractor: Arc<dyn TextExtractor>,
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SchemeRegistry {
    /// No readers; magic-byte sniffing and the built-in text extractor.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            sniffer: Arc::new(MagicSniffer),
            text_extractor: Arc::new(PlainTextExtractor),
        }
    }

    /// The bundled readers: `mbox`, `mboxdir` and `eml`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(
            SchemeEntry::new("mbox", MboxReader)
                .with_media_type("application/mbox")
                .as_container(),
        );
        registry.register(SchemeEntry::new("mboxdir", MboxDirReader));
        registry.register(SchemeEntry::new("eml", EmlReader).with_media_type("message/rfc822"));
        registry
    }

    /// Add an entry, replacing any entry with the same scheme.
    pub fn register(&mut self, entry: SchemeEntry) {
        self.entries.retain(|e| e.scheme != entry.scheme);
        self.entries.push(entry);
    }

    pub fn with_sniffer(mut self, sniffer: impl ContentSniffer + 'static) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    pub fn with_text_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.text_extractor = Arc::new(extractor);
        self
    }

    pub fn get(&self, scheme: &str) -> Option<&SchemeEntry> {
        self.entries
            .iter()
            .find(|e| e.scheme.eq_ignore_ascii_case(scheme))
    }

    /// The entry whose media types include `media_type`.
    pub fn for_media_type(&self, media_type: &str) -> Option<&SchemeEntry> {
        let wanted = essence(media_type);
        self.entries
            .iter()
            .find(|e| e.media_types.iter().any(|m| essence(m) == wanted))
    }

    /// The container entry matching sniffed `content`, if any.
    pub fn container_for_content(&self, content: &[u8]) -> Option<&SchemeEntry> {
        self.for_media_type(&self.sniffer.sniff(content))
            .filter(|e| e.container)
    }

    pub fn sniffer(&self) -> &dyn ContentSniffer {
        self.sniffer.as_ref()
    }

    pub fn text_extractor(&self) -> &dyn TextExtractor {
        self.text_extractor.as_ref()
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.scheme.as_str())
    }
}
