//! Attachment parts found while walking a message's body tree.

/// A leaf part of a message that declares a filename.
///
/// Built transiently for each message; the payload is already
/// transfer-decoded (base64 / quoted-printable resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPart {
    /// Filename as declared in `Content-Disposition` or `Content-Type`.
    /// May still contain RFC 2047 encoded-words.
    pub filename: String,

    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Decoded binary payload.
    pub data: Vec<u8>,
}

impl AttachmentPart {
    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
