//! Centralized error types for the archiver.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::MessageId;

/// All errors produced by the attachment-archiver library.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The mail server could not be reached or the connection dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the credentials.
    #[error("Login failed for '{user}': {reason}")]
    Auth { user: String, reason: String },

    /// A protocol-level error reported by the IMAP client.
    #[error("IMAP error: {0}")]
    Imap(#[from] imap::Error),

    /// TLS setup failed before a connection could be attempted.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A header value could not be decoded.
    #[error("Header decoding error: {0}")]
    HeaderDecode(String),

    /// The `Date:` header did not match the expected fixed format.
    #[error("Could not parse date '{input}': {reason}")]
    DateParse { input: String, reason: String },

    /// The message carries no `From:` header.
    #[error("Message {0} has no From header")]
    MissingSender(MessageId),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// The configuration is incomplete or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The character encoding is not supported.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Auth { .. } | Self::Imap(_) | Self::Tls(_) | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ArchiveError::Connection("reset".into()).is_fatal());
        assert!(ArchiveError::Auth {
            user: "me".into(),
            reason: "bad password".into()
        }
        .is_fatal());
        assert!(!ArchiveError::MissingSender(3).is_fatal());
        assert!(!ArchiveError::Mime("truncated".into()).is_fatal());
        assert!(!ArchiveError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
        )
        .is_fatal());
    }

    #[test]
    fn test_display_includes_path() {
        let err = ArchiveError::io(
            "/archive/a.pdf",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/archive/a.pdf"));
        assert!(msg.contains("disk full"));
    }
}
