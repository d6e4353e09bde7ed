//! Output package nodes: naming, structured metadata and disk serialization.

pub mod metadata;
pub mod naming;
pub mod node;

pub use metadata::{MetadataFormat, MetadataTree, MetadataValue};
pub use naming::NodeKind;
pub use node::{ArchiveNode, PayloadUsage};
