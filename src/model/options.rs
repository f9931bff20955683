//! Options controlling one archiving run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the text encoding of a raw message is chosen before MIME parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CharsetStrategy {
    /// Scan the raw bytes for the first `charset=` marker, falling back to
    /// the configured default.
    #[default]
    Sniffed,
    /// Trust the charsets declared in the message structure.
    Declared,
}

/// What to do with a message that has no `From:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingSenderPolicy {
    /// Log, count and continue with the next message.
    #[default]
    Skip,
    /// Stop the run with an error.
    Abort,
}

/// Everything the extractor needs besides the session itself.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Root of the `{sender}/{filename}` output tree.
    pub storage_root: PathBuf,
    /// IMAP `SEARCH` criterion (`"ALL"`, `"UNSEEN"`, ...).
    pub search_query: String,
    /// Charset detection strategy, fixed for the whole run.
    pub charset_strategy: CharsetStrategy,
    /// Charset used when sniffing finds no `charset=` marker.
    pub default_charset: String,
    /// Behavior for messages without a sender.
    pub on_missing_sender: MissingSenderPolicy,
    /// Set `\Deleted` on every fully archived message.
    pub delete_after_archive: bool,
    /// Issue `EXPUNGE` once all messages are processed.
    pub expunge: bool,
}

impl ArchiveOptions {
    /// Options with the defaults used by the command line.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            search_query: "ALL".to_string(),
            charset_strategy: CharsetStrategy::default(),
            default_charset: crate::parser::charset::DEFAULT_CHARSET.to_string(),
            on_missing_sender: MissingSenderPolicy::default(),
            delete_after_archive: false,
            expunge: false,
        }
    }
}
