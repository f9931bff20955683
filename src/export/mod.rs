//! Writing attachments to disk and the run orchestrator.

pub mod attachment;
pub mod extractor;
