//! The archiving run: walk every message, write its attachments, flag it.

use tracing::{debug, error, info, warn};

use crate::error::{ArchiveError, Result};
use crate::export::attachment::{
    sanitize_path_component, save_attachment, sender_dir_name, Disambiguator,
};
use crate::model::options::{ArchiveOptions, MissingSenderPolicy};
use crate::model::report::ExtractionReport;
use crate::model::MessageId;
use crate::parser::date::parse_date;
use crate::parser::header::{decode_filename, decode_sender};
use crate::parser::mime::decode_message;
use crate::session::{Flag, MailboxSession};

/// Archive every message matching `options.search_query`.
///
/// Messages are handled one at a time: fetched, decoded, attachments written,
/// then flagged. Item-level failures are logged and counted in the report;
/// only transport errors (and a missing sender under
/// [`MissingSenderPolicy::Abort`]) end the run early.
///
/// The progress callback receives `(done, total)` before each message and
/// once more when the loop finishes.
pub fn run<S>(
    session: &mut S,
    options: &ArchiveOptions,
    progress: &dyn Fn(usize, usize),
) -> Result<ExtractionReport>
where
    S: MailboxSession + ?Sized,
{
    let ids = session.search_all(&options.search_query)?;
    let total = ids.len();
    info!(total, query = %options.search_query, "Messages found in mailbox");

    let mut report = ExtractionReport {
        messages_total: total,
        ..Default::default()
    };

    for (i, &id) in ids.iter().enumerate() {
        progress(i, total);

        let raw = match session.fetch_raw(id) {
            Ok(raw) if raw.is_empty() => {
                error!(id, "Server returned an empty message");
                report.messages_failed += 1;
                continue;
            }
            Ok(raw) => raw,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(id, error = %e, "Failed to fetch message");
                report.messages_failed += 1;
                continue;
            }
        };

        archive_message(session, id, &raw, options, &mut report)?;
    }
    progress(total, total);

    if options.expunge {
        let removed = session.expunge()?;
        report.expunged = true;
        info!(removed, "Expunged messages marked for deletion");
    }

    info!(
        processed = report.messages_processed,
        skipped = report.messages_skipped,
        failed = report.messages_failed,
        attachments = report.attachments_written,
        "Archiving finished"
    );

    Ok(report)
}

/// Handle one fetched message. Only run-ending errors are returned.
fn archive_message<S>(
    session: &mut S,
    id: MessageId,
    raw: &[u8],
    options: &ArchiveOptions,
    report: &mut ExtractionReport,
) -> Result<()>
where
    S: MailboxSession + ?Sized,
{
    let message = match decode_message(raw, options.charset_strategy, &options.default_charset) {
        Ok(message) => message,
        Err(e) => {
            error!(id, error = %e, "Failed to decode message");
            report.messages_failed += 1;
            return Ok(());
        }
    };

    let Some(from) = message.from.as_deref() else {
        return match options.on_missing_sender {
            MissingSenderPolicy::Skip => {
                warn!(id, "Message has no From header, skipping");
                report.messages_skipped += 1;
                Ok(())
            }
            MissingSenderPolicy::Abort => Err(ArchiveError::MissingSender(id)),
        };
    };

    let sender = sender_dir_name(&decode_sender(from));
    let disambiguator = match message.date.as_deref().map(parse_date) {
        Some(Ok(date)) => Disambiguator::Timestamp(date),
        Some(Err(e)) => {
            warn!(id, error = %e, "Unparseable date, collisions will use the message id");
            report.date_fallbacks += 1;
            Disambiguator::MessageId(id)
        }
        None => {
            warn!(id, "Message has no Date header, collisions will use the message id");
            report.date_fallbacks += 1;
            Disambiguator::MessageId(id)
        }
    };

    debug!(
        id,
        sender = %sender,
        charset = message.charset.as_deref().unwrap_or("declared"),
        attachments = message.attachments.len(),
        "Archiving message"
    );

    let sender_dir = options.storage_root.join(&sender);
    let mut failures = 0usize;

    for part in &message.attachments {
        let decoded = decode_filename(&part.filename);
        let Some(filename) = sanitize_path_component(&decoded) else {
            warn!(id, filename = %part.filename, "Unusable attachment filename, skipping");
            report.attachments_skipped += 1;
            continue;
        };

        match save_attachment(&sender_dir, &filename, &part.data, &disambiguator) {
            Ok(path) => {
                debug!(
                    id,
                    path = %path.display(),
                    size = part.size(),
                    content_type = %part.content_type,
                    "Attachment written"
                );
                report.attachments_written += 1;
                report.bytes_written += part.size();
            }
            Err(e) => {
                error!(id, filename = %filename, error = %e, "Failed to write attachment");
                report.attachments_failed += 1;
                failures += 1;
            }
        }
    }

    if failures > 0 {
        warn!(id, failures, "Leaving message unflagged so the next run retries it");
        report.messages_failed += 1;
        return Ok(());
    }

    session.set_flag(id, Flag::Seen)?;
    if options.delete_after_archive {
        session.set_flag(id, Flag::Deleted)?;
        report.messages_marked_deleted += 1;
    }
    report.messages_processed += 1;

    Ok(())
}
