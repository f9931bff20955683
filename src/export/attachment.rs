//! Write attachments to `{storage_root}/{sender}/{filename}` without clobbering.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::error::{ArchiveError, Result};
use crate::model::MessageId;
use crate::parser::date::timestamp_prefix;

/// Name used when a sender reduces to nothing usable.
const UNKNOWN_SENDER: &str = "unknown";

/// What goes in front of a filename that is already taken.
#[derive(Debug, Clone, PartialEq)]
pub enum Disambiguator {
    /// The message date, rendered `YYYYMMDDHHMMSS`.
    Timestamp(DateTime<FixedOffset>),
    /// Used when the date could not be parsed: `id{N}`.
    MessageId(MessageId),
}

impl Disambiguator {
    /// The prefix, without the joining underscore.
    pub fn prefix(&self) -> String {
        match self {
            Self::Timestamp(date) => timestamp_prefix(date),
            Self::MessageId(id) => format!("id{id}"),
        }
    }
}

/// Make a string safe to use as a single path component.
///
/// Path separators, NUL and control characters become `_`; everything else
/// (spaces, non-ASCII) is kept so layouts match earlier archives. Returns
/// `None` for names that cannot be a file: empty, `.` or `..`.
pub fn sanitize_path_component(s: &str) -> Option<String> {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    match sanitized.trim() {
        "" | "." | ".." => None,
        _ => Some(sanitized),
    }
}

/// Directory name for a decoded sender.
pub fn sender_dir_name(sender: &str) -> String {
    sanitize_path_component(sender).unwrap_or_else(|| UNKNOWN_SENDER.to_string())
}

/// Pick the path an attachment will be written to.
///
/// `dir/filename` if free, else `dir/{prefix}_{filename}`, else a counter is
/// appended to the prefixed stem until a free name is found.
pub fn destination_path(dir: &Path, filename: &str, disambiguator: &Disambiguator) -> PathBuf {
    let plain = dir.join(filename);
    if !plain.exists() {
        return plain;
    }

    let prefixed = dir.join(format!("{}_{filename}", disambiguator.prefix()));
    unique_path(&prefixed)
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut i: u64 = 1;
    loop {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Write `data` to a new file at `path`, creating parent directories first.
///
/// Fails rather than overwrite if the file appeared in the meantime. The
/// data is synced before returning.
pub fn write_new_file(path: &Path, data: &[u8]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ArchiveError::io(path, e))?;
    file.write_all(data).map_err(|e| ArchiveError::io(path, e))?;
    file.sync_all().map_err(|e| ArchiveError::io(path, e))?;

    Ok(data.len() as u64)
}

/// Save one attachment into `sender_dir`, applying the collision rule.
pub fn save_attachment(
    sender_dir: &Path,
    filename: &str,
    data: &[u8],
    disambiguator: &Disambiguator,
) -> Result<PathBuf> {
    std::fs::create_dir_all(sender_dir).map_err(|e| ArchiveError::io(sender_dir, e))?;
    let path = destination_path(sender_dir, filename, disambiguator);
    write_new_file(&path, data)?;
    Ok(path)
}
