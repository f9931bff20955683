//! Core data model types: attachment parts, run options, and the extraction report.

pub mod attachment;
pub mod options;
pub mod report;

/// Server-assigned message sequence number, as returned by `SEARCH`.
pub type MessageId = u32;
