//! RFC 5322 header handling: unfolding, lookup, and RFC 2047 encoded-words.
//!
//! The sender and filename decoders reproduce the fixed heuristics of the
//! legacy archiver so that directory layouts produced by earlier runs stay
//! stable. They never fail: malformed input falls back to the raw value.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::parser::charset::decode_with_charset;

/// Base64 engine for encoded-words and part bodies: mailers often drop the
/// trailing `=`.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Normalize a raw `From:` value into a directory-name key.
///
/// Steps, in order:
/// 1. If the value contains a space, keep the second token of a split on
///    `' '` (meant to isolate `<address>` after a display name).
/// 2. Remove every `<` and `>`.
/// 3. If a `?` remains, decode RFC 2047 encoded-words and keep the last
///    decoded segment.
///
/// Known limitation: a display name with inner spaces mis-parses, e.g.
/// `John Q Public <jqp@x.com>` yields `Q`. Archives written by earlier runs
/// are laid out with this behavior, so it is kept as is.
pub fn decode_sender(raw: &str) -> String {
    let token = if raw.contains(' ') {
        raw.split(' ').nth(1).unwrap_or_default()
    } else {
        raw
    };
    let sender = strip_angle_brackets(token);

    if !sender.contains('?') {
        return sender;
    }

    match decode_encoded_words(&sender) {
        Ok(mut segments) => match segments.pop() {
            Some(last) => strip_angle_brackets(&last.text),
            None => sender,
        },
        Err(e) => {
            warn!(error = %e, "Keeping raw sender");
            sender
        }
    }
}

/// Decode an attachment filename that may be RFC 2047 encoded.
///
/// Values without a `?` are returned unchanged. Every segment is decoded
/// with its own declared charset and the results are concatenated, so
/// `=?UTF-8?B?cmVwb3J0?=.pdf` becomes `report.pdf`.
pub fn decode_filename(raw: &str) -> String {
    if !raw.contains('?') {
        return raw.to_string();
    }

    match decode_encoded_words(raw) {
        Ok(segments) => {
            let charsets: Vec<&str> = segments
                .iter()
                .filter_map(|s| s.charset.as_deref())
                .collect();
            debug!(filename = raw, ?charsets, "Decoding encoded filename");
            segments.into_iter().map(|s| s.text).collect()
        }
        Err(e) => {
            warn!(error = %e, "Keeping raw filename");
            raw.to_string()
        }
    }
}

fn decode_encoded_words(raw: &str) -> Result<Vec<HeaderSegment>> {
    decode_header_segments(raw)
        .ok_or_else(|| ArchiveError::HeaderDecode(format!("no valid encoded-word in '{raw}'")))
}

fn strip_angle_brackets(s: &str) -> String {
    s.chars().filter(|&c| c != '<' && c != '>').collect()
}

/// One decoded run of a header value.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSegment {
    /// Decoded text.
    pub text: String,
    /// Charset declared by the encoded-word, `None` for plain text runs.
    pub charset: Option<String>,
}

/// Split a header value into plain and encoded runs and decode each one.
///
/// Adjacent encoded-words sharing a charset are merged *before* charset
/// decoding, so multi-byte characters split across words survive. Plain runs
/// are trimmed and dropped when empty (whitespace between encoded-words is
/// not significant, RFC 2047 §6.2).
///
/// Returns `None` when the value holds no well-formed encoded-word.
pub fn decode_header_segments(input: &str) -> Option<Vec<HeaderSegment>> {
    let mut raw: Vec<RawSegment> = Vec::new();
    let mut plain = String::new();
    let mut remaining = input;
    let mut found = false;

    while let Some(start) = remaining.find("=?") {
        plain.push_str(&remaining[..start]);
        let after_start = &remaining[start + 2..];

        if let Some(word) = try_decode_one_word(after_start) {
            flush_plain(&mut raw, &mut plain);
            push_encoded(&mut raw, word.charset, word.bytes);
            remaining = &after_start[word.consumed..];
            found = true;
        } else {
            plain.push_str("=?");
            remaining = after_start;
        }
    }
    plain.push_str(remaining);
    flush_plain(&mut raw, &mut plain);

    if !found {
        return None;
    }

    Some(
        raw.into_iter()
            .map(|segment| match segment.charset {
                Some(charset) => HeaderSegment {
                    text: decode_with_charset(&segment.bytes, &charset),
                    charset: Some(charset),
                },
                None => HeaderSegment {
                    text: String::from_utf8_lossy(&segment.bytes).into_owned(),
                    charset: None,
                },
            })
            .collect(),
    )
}

struct RawSegment {
    bytes: Vec<u8>,
    charset: Option<String>,
}

fn flush_plain(raw: &mut Vec<RawSegment>, plain: &mut String) {
    let trimmed = plain.trim();
    if !trimmed.is_empty() {
        raw.push(RawSegment {
            bytes: trimmed.as_bytes().to_vec(),
            charset: None,
        });
    }
    plain.clear();
}

fn push_encoded(raw: &mut Vec<RawSegment>, charset: String, bytes: Vec<u8>) {
    if let Some(last) = raw.last_mut() {
        if let Some(last_charset) = &last.charset {
            if last_charset.eq_ignore_ascii_case(&charset) {
                last.bytes.extend_from_slice(&bytes);
                return;
            }
        }
    }
    raw.push(RawSegment {
        bytes,
        charset: Some(charset),
    });
}

struct DecodedWord {
    charset: String,
    bytes: Vec<u8>,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() {
        return None;
    }
    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => {
            let compact: String = encoded_text
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64.decode(compact).ok()?
        }
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        charset: charset.to_string(),
        bytes,
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation line
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_display_name_and_address() {
        assert_eq!(
            decode_sender("\"Alice\" <alice@example.com>"),
            "alice@example.com"
        );
    }

    #[test]
    fn test_sender_bare_address() {
        assert_eq!(decode_sender("bob@example.com"), "bob@example.com");
        assert_eq!(decode_sender("<bob@example.com>"), "bob@example.com");
    }

    #[test]
    fn test_sender_encoded_name_before_address() {
        // 张三 <zhangsan@example.cn>
        assert_eq!(
            decode_sender("=?UTF-8?B?5byg5LiJ?= <zhangsan@example.cn>"),
            "zhangsan@example.cn"
        );
    }

    #[test]
    fn test_sender_encoded_name_glued_to_address() {
        // No space: the encoded name and the address stay in one token and
        // the last decoded segment (the address) wins.
        assert_eq!(
            decode_sender("=?GBK?B?1cXI/Q==?=<zhangsan@example.cn>"),
            "zhangsan@example.cn"
        );
    }

    #[test]
    fn test_sender_only_encoded_word() {
        assert_eq!(decode_sender("=?UTF-8?Q?caf=C3=A9?="), "café");
    }

    #[test]
    fn test_sender_spaced_display_name_limitation() {
        assert_eq!(decode_sender("John Q Public <jqp@x.com>"), "Q");
    }

    #[test]
    fn test_sender_malformed_encoded_word_falls_back() {
        assert_eq!(decode_sender("who?@example.com"), "who?@example.com");
    }

    #[test]
    fn test_sender_never_contains_brackets() {
        for raw in [
            "<<a@b.com>>",
            "Name <a@b.com>",
            "=?UTF-8?Q?=3Cx=3E?=",
            "\"N\" <=?UTF-8?B?PGE+?=>",
        ] {
            let sender = decode_sender(raw);
            assert!(!sender.contains('<') && !sender.contains('>'), "{raw} -> {sender}");
        }
    }

    #[test]
    fn test_filename_plain() {
        assert_eq!(decode_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn test_filename_base64_utf8() {
        // 报告.pdf
        assert_eq!(decode_filename("=?UTF-8?B?5oql5ZGKLnBkZg==?="), "报告.pdf");
    }

    #[test]
    fn test_filename_base64_gb2312() {
        // 报告.doc in GB2312: B1 A8 B8 E6 2E 64 6F 63
        assert_eq!(decode_filename("=?gb2312?B?sai45i5kb2M=?="), "报告.doc");
    }

    #[test]
    fn test_filename_unpadded_base64() {
        assert_eq!(decode_filename("=?UTF-8?B?cmVwb3J0LnBkZg?="), "report.pdf");
    }

    #[test]
    fn test_filename_split_across_words() {
        // "报告" split mid-character across two words of the same charset.
        // E6 8A A5 | E5 91 8A
        let raw = "=?UTF-8?Q?=E6=8A?= =?UTF-8?Q?=A5=E5=91=8A.txt?=";
        assert_eq!(decode_filename(raw), "报告.txt");
    }

    #[test]
    fn test_filename_with_plain_suffix() {
        assert_eq!(decode_filename("=?UTF-8?B?cmVwb3J0?=.pdf"), "report.pdf");
    }

    #[test]
    fn test_filename_q_underscore() {
        assert_eq!(
            decode_filename("=?ISO-8859-1?Q?R=E9sum=E9_final.pdf?="),
            "Résumé final.pdf"
        );
    }

    #[test]
    fn test_filename_malformed_falls_back() {
        assert_eq!(decode_filename("why?.txt"), "why?.txt");
        assert_eq!(decode_filename("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_segments_keep_charsets() {
        let segments =
            decode_header_segments("=?UTF-8?B?SG9sYQ==?= plain =?ISO-8859-1?Q?caf=E9?=").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "Hola");
        assert_eq!(segments[0].charset.as_deref(), Some("UTF-8"));
        assert_eq!(segments[1].text, "plain");
        assert_eq!(segments[1].charset, None);
        assert_eq!(segments[2].text, "café");
    }

    #[test]
    fn test_segments_none_without_encoded_word() {
        assert!(decode_header_segments("plain text").is_none());
    }

    #[test]
    fn test_rfc2231_language_suffix() {
        assert_eq!(decode_filename("=?UTF-8*en?Q?notes.txt?="), "notes.txt");
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_get_header_first_wins() {
        let headers = unfold_headers("From: a@b.com\nFROM: c@d.com\n");
        assert_eq!(get_header(&headers, "From").as_deref(), Some("a@b.com"));
        assert_eq!(get_header(&headers, "date"), None);
    }

    #[test]
    fn test_decode_header_bytes_latin1_fallback() {
        assert_eq!(decode_header_bytes(b"From: M\xfcller"), "From: Müller");
        assert_eq!(decode_header_bytes(b"\xEF\xBB\xBFFrom: a"), "From: a");
    }
}
