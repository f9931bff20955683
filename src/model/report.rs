//! Summary counters returned by an archiving run.

use serde::Serialize;

/// Counts collected while walking the mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Messages returned by the search.
    pub messages_total: usize,
    /// Messages whose attachments were all handled.
    pub messages_processed: usize,
    /// Messages skipped because they have no sender.
    pub messages_skipped: usize,
    /// Messages that could not be fetched or parsed.
    pub messages_failed: usize,
    /// Attachment files created.
    pub attachments_written: usize,
    /// Attachments whose declared filename was unusable.
    pub attachments_skipped: usize,
    /// Attachments lost to a filesystem error.
    pub attachments_failed: usize,
    /// Total payload bytes written.
    pub bytes_written: u64,
    /// Messages whose date could not be parsed.
    pub date_fallbacks: usize,
    /// Messages flagged `\Deleted`.
    pub messages_marked_deleted: usize,
    /// Whether `EXPUNGE` was issued.
    pub expunged: bool,
}

impl ExtractionReport {
    /// `true` when no item-level failure was recorded.
    pub fn is_clean(&self) -> bool {
        self.messages_failed == 0 && self.attachments_failed == 0
    }
}
