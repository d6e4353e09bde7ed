//! `mailpack`: converts mail stores into self-describing archival packages.
//!
//! A store (an mbox file, a directory of mbox files, a single message, or
//! any store a host registers a reader for) is walked depth-first. Every
//! folder, message and attachment becomes a node directory carrying a
//! structured metadata document; messages keep their byte-exact content,
//! synthesized from normalized fields when the store has none. Attachments
//! that are mail stores themselves are extracted recursively.

pub mod archive;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;
pub mod store;
pub mod synth;
