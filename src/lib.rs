//! `attachment-archiver`: download the attachments of an IMAP mailbox into a
//! per-sender directory tree.
//!
//! The library holds the header and date heuristics, MIME decoding, the
//! mailbox session abstraction and the extraction run; the binary adds
//! configuration loading, logging and the command line.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod session;
