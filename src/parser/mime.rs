//! MIME message decoding: charset handling, header lookup, and the part walk.

use base64::Engine as _;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::model::attachment::AttachmentPart;
use crate::model::options::CharsetStrategy;
use crate::parser::charset::{decode_with_charset, resolve_charset};
use crate::parser::header::{decode_header_bytes, get_header, unfold_headers, LENIENT_BASE64};

/// Maximum nesting of multipart / embedded-message containers that is followed.
const MAX_DEPTH: usize = 10;

/// The parts of a message the extractor cares about.
#[derive(Debug, Clone, Default)]
pub struct DecodedMessage {
    /// Raw (unfolded, not RFC 2047 decoded) `From:` value, if present and non-blank.
    pub from: Option<String>,
    /// Raw `Date:` value.
    pub date: Option<String>,
    /// Charset chosen by sniffing; `None` under [`CharsetStrategy::Declared`].
    pub charset: Option<String>,
    /// Parts declaring a filename, in depth-first order, with their
    /// transfer-decoded bytes.
    pub attachments: Vec<AttachmentPart>,
}

/// Decode a raw message fetched from the server.
///
/// With [`CharsetStrategy::Sniffed`] the whole message is first converted to
/// text using [`resolve_charset`]; header lookup and MIME parsing both run on
/// that text. With [`CharsetStrategy::Declared`] the raw bytes go straight to
/// the MIME parser.
pub fn decode_message(
    raw_message: &[u8],
    strategy: CharsetStrategy,
    default_charset: &str,
) -> Result<DecodedMessage> {
    let message_bytes = skip_from_line(raw_message);

    match strategy {
        CharsetStrategy::Sniffed => {
            let charset = resolve_charset(message_bytes, default_charset);
            debug!(charset = %charset, "Decoding message with sniffed charset");
            let text = decode_with_charset(message_bytes, &charset);
            let mut decoded = decode_bytes(text.as_bytes())?;
            decoded.charset = Some(charset);
            Ok(decoded)
        }
        CharsetStrategy::Declared => decode_bytes(message_bytes),
    }
}

fn decode_bytes(message_bytes: &[u8]) -> Result<DecodedMessage> {
    let header_end = find_header_end(message_bytes).unwrap_or(message_bytes.len());
    let headers = unfold_headers(&decode_header_bytes(&message_bytes[..header_end]));

    let from = get_header(&headers, "from").filter(|v| !v.trim().is_empty());
    let date = get_header(&headers, "date");

    let parser = MessageParser::default();
    let msg = parser
        .parse(message_bytes)
        .ok_or_else(|| ArchiveError::Mime("Message could not be parsed".into()))?;

    let mut attachments = Vec::new();
    collect_attachments(&msg, 0, &mut attachments);

    Ok(DecodedMessage {
        from,
        date,
        charset: None,
        attachments,
    })
}

/// Walk a message's part tree depth-first, starting at its root part.
fn collect_attachments(msg: &Message<'_>, depth: usize, out: &mut Vec<AttachmentPart>) {
    if let Some(root) = msg.parts.first() {
        walk_part(msg, root, depth, out);
    }
}

fn walk_part(msg: &Message<'_>, part: &MessagePart<'_>, depth: usize, out: &mut Vec<AttachmentPart>) {
    if depth > MAX_DEPTH {
        warn!(depth, "Part tree nested too deeply, ignoring the rest");
        return;
    }

    match &part.body {
        // Grouping node, not payload.
        PartType::Multipart(children) => {
            for id in children {
                if let Some(child) = msg.parts.get(*id as usize) {
                    walk_part(msg, child, depth + 1, out);
                }
            }
        }
        // Forwarded message: saved whole when it is named, and its own
        // attachments count either way.
        PartType::Message(inner) => {
            push_named(msg, part, out);
            collect_attachments(inner, depth + 1, out);
        }
        _ => push_named(msg, part, out),
    }
}

/// Record `part` if it declares a non-blank filename.
fn push_named(msg: &Message<'_>, part: &MessagePart<'_>, out: &mut Vec<AttachmentPart>) {
    let Some(filename) = part
        .attachment_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    else {
        return;
    };

    if part.is_encoding_problem {
        warn!(filename, "Attachment payload had transfer-encoding problems");
    }

    out.push(AttachmentPart {
        filename: filename.to_string(),
        content_type: content_type_of(part),
        data: payload_bytes(msg, part),
    });
}

/// The part body after transfer decoding only.
///
/// `mail-parser` hands text parts back converted to UTF-8 and embedded
/// messages back as the whole enclosing buffer, so both are cut from the raw
/// message and decoded here instead.
fn payload_bytes(msg: &Message<'_>, part: &MessagePart<'_>) -> Vec<u8> {
    if let PartType::Binary(bytes) | PartType::InlineBinary(bytes) = &part.body {
        return bytes.to_vec();
    }

    let raw = msg
        .raw_message()
        .get(part.raw_body_offset()..part.raw_end_offset())
        .unwrap_or_default();

    match part.encoding {
        Encoding::None => raw.to_vec(),
        Encoding::Base64 => {
            let compact: Vec<u8> = raw
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64.decode(compact).unwrap_or_else(|e| {
                warn!(error = %e, "Invalid base64 body, keeping parser output");
                part.contents().to_vec()
            })
        }
        Encoding::QuotedPrintable => quoted_printable_decode(raw).unwrap_or_else(|| {
            warn!("Invalid quoted-printable body, keeping parser output");
            part.contents().to_vec()
        }),
    }
}

fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Skip a leading BOM and the `From ` separator line of mbox-framed messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    if data.starts_with(b"From ") {
        // Find end of line
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Find the byte offset where headers end (position of the first blank line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    // Look for \n\n or \r\n\r\n
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}
