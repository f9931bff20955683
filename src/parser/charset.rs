//! Charset sniffing on raw message bytes.
//!
//! Declared charsets in the MIME structure are unreliable for the mail this
//! tool targets (8-bit headers written by legacy East Asian clients), so the
//! whole raw message is scanned for the first `charset=` marker instead and
//! decoded with it before any MIME parsing happens.

use tracing::{debug, warn};

/// Charset used when a message declares none.
pub const DEFAULT_CHARSET: &str = "gb2312";

const MARKER: &[u8] = b"charset=";

/// Guess the text encoding of a raw message.
///
/// The value starts right after the first literal `charset=` and ends at the
/// nearest `;`, CR or LF (or the end of input). Surrounding whitespace and
/// quote characters are stripped. Without a marker, or with an empty value,
/// `default` is returned.
pub fn resolve_charset(raw: &[u8], default: &str) -> String {
    let Some(start) = find_subslice(raw, MARKER) else {
        return default.to_string();
    };

    let value = &raw[start + MARKER.len()..];
    let end = value
        .iter()
        .position(|&b| matches!(b, b';' | b'\r' | b'\n'))
        .unwrap_or(value.len());

    let value = String::from_utf8_lossy(&value[..end]);
    let value = value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();

    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Decode bytes using a named charset.
///
/// Unknown labels fall back to lossy UTF-8.
pub fn decode_with_charset(bytes: &[u8], charset: &str) -> String {
    let charset_lower = charset.to_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, used, had_errors) = encoding.decode(bytes);
                if had_errors {
                    debug!(
                        charset = charset,
                        used = used.name(),
                        "Malformed byte sequences replaced while decoding"
                    );
                }
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Whether `encoding_rs` knows the label.
pub fn is_known_charset(charset: &str) -> bool {
    encoding_rs::Encoding::for_label(charset.trim().as_bytes()).is_some()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
