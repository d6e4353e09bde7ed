//! Core data model: addresses, normalized message fields, attachments,
//! date ranges and extraction statistics.

pub mod address;
pub mod attachment;
pub mod date_range;
pub mod message;
pub mod stats;
