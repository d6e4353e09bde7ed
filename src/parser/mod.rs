//! Email parsing: MBOX streaming splitter, header decoding, MIME conversion
//! and rich-text de-encapsulation.

pub mod header;
pub mod mbox;
pub mod mime;
pub mod rtf;
