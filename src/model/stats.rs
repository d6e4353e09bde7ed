//! Running counters of an extraction job.

/// Statistics of one extraction (or one nested container extraction).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtractionStats {
    /// Folders visited below the extraction root, retained or dropped.
    pub folders: u64,
    /// Messages extracted directly from this store.
    pub elements: u64,
    /// Byte size of those messages' byte-exact content.
    pub raw_size: u64,
    /// Messages found inside container attachments, at any depth.
    pub attached_elements: u64,
}

impl ExtractionStats {
    pub fn add(&mut self, folders: u64, elements: u64, raw_size: u64, attached_elements: u64) {
        self.folders += folders;
        self.elements += elements;
        self.raw_size += raw_size;
        self.attached_elements += attached_elements;
    }

    /// Messages a nested extraction contributes to its parent's attached count.
    pub fn nested_contribution(&self) -> u64 {
        self.elements + self.attached_elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contribution() {
        let mut stats = ExtractionStats::default();
        stats.add(1, 3, 300, 0);
        stats.add(0, 2, 50, 4);
        assert_eq!(stats.folders, 1);
        assert_eq!(stats.elements, 5);
        assert_eq!(stats.raw_size, 350);
        assert_eq!(stats.nested_contribution(), 9);
    }
}
