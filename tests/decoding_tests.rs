//! Integration tests for header, date and charset decoding and the
//! collision rule.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use attachment_archiver::export::attachment::{save_attachment, Disambiguator};
use attachment_archiver::parser::charset::resolve_charset;
use attachment_archiver::parser::date::{parse_date, timestamp_prefix};
use attachment_archiver::parser::header::{decode_filename, decode_sender};

// ─── Filenames ──────────────────────────────────────────────────────

#[test]
fn test_filename_base64_utf8() {
    assert_eq!(decode_filename("=?UTF-8?B?5oql5ZGKLnBkZg==?="), "报告.pdf");
}

#[test]
fn test_filename_base64_gbk() {
    assert_eq!(decode_filename("=?GBK?B?sai45i5kb2M=?="), "报告.doc");
}

#[test]
fn test_filename_quoted_printable_utf8() {
    assert_eq!(
        decode_filename("=?utf-8?Q?=E6=8A=A5=E5=91=8A.pdf?="),
        "报告.pdf"
    );
}

#[test]
fn test_filename_plain_is_untouched() {
    assert_eq!(decode_filename("report final.pdf"), "report final.pdf");
}

#[test]
fn test_filename_with_plain_extension_keeps_it() {
    assert_eq!(decode_filename("=?UTF-8?B?5oql5ZGK?=.pdf"), "报告.pdf");
}

// ─── Senders ────────────────────────────────────────────────────────

#[test]
fn test_sender_quoted_name_and_address() {
    assert_eq!(decode_sender("\"Alice\" <alice@example.com>"), "alice@example.com");
}

#[test]
fn test_sender_bare_address() {
    assert_eq!(decode_sender("bob@example.com"), "bob@example.com");
}

#[test]
fn test_sender_encoded_display_name_keeps_address() {
    assert_eq!(
        decode_sender("=?UTF-8?B?5byg5LiJ?= <zhang@example.cn>"),
        "zhang@example.cn"
    );
}

#[test]
fn test_sender_multi_word_name_limitation() {
    // Second whitespace token wins; archives are already laid out this way.
    assert_eq!(decode_sender("John Q Public <jqp@x.com>"), "Q");
}

// ─── Dates ──────────────────────────────────────────────────────────

#[test]
fn test_date_weekday_prefix_is_optional() {
    let with = parse_date("Mon, 15 Jan 2024 09:30:00 +0800").unwrap();
    let without = parse_date("15 Jan 2024 09:30:00 +0800").unwrap();
    assert_eq!(with, without);
    assert_eq!(timestamp_prefix(&with), "20240115093000");
}

#[test]
fn test_date_trailing_comment_beyond_budget() {
    let date = parse_date("Tue, 16 Jan 2024 14:05:09 +0800 (CST)").unwrap();
    assert_eq!(timestamp_prefix(&date), "20240116140509");
}

#[test]
fn test_date_garbage_is_error() {
    assert!(parse_date("yesterday-ish").is_err());
}

// ─── Charset sniffing ───────────────────────────────────────────────

#[test]
fn test_charset_terminators() {
    assert_eq!(resolve_charset(b"Content-Type: text/plain; charset=gbk; format=flowed", "gb2312"), "gbk");
    assert_eq!(resolve_charset(b"Content-Type: text/plain; charset=big5\r\n", "gb2312"), "big5");
    assert_eq!(resolve_charset(b"Content-Type: text/plain; charset=utf-8\nX: y", "gb2312"), "utf-8");
}

#[test]
fn test_charset_default_without_marker() {
    assert_eq!(resolve_charset(b"Subject: hi\r\n\r\nbody", "gb2312"), "gb2312");
}

#[test]
fn test_charset_first_marker_wins() {
    let raw = b"Content-Type: text/plain; charset=\"iso-8859-1\"\r\n\r\n--b\r\nContent-Type: text/html; charset=utf-8\r\n";
    assert_eq!(resolve_charset(raw, "gb2312"), "iso-8859-1");
}

// ─── Collision rule ─────────────────────────────────────────────────

#[test]
fn test_same_name_twice_gets_timestamp_prefix() {
    let root = TempDir::new().unwrap();
    let sender_dir = root.child("alice@example.com");
    let first = Disambiguator::Timestamp(parse_date("Mon, 15 Jan 2024 09:30:00 +0800").unwrap());
    let second = Disambiguator::Timestamp(parse_date("Tue, 16 Jan 2024 14:05:09 +0800").unwrap());

    let a = save_attachment(sender_dir.path(), "report.pdf", b"first", &first).unwrap();
    let b = save_attachment(sender_dir.path(), "report.pdf", b"second", &second).unwrap();

    assert_ne!(a, b);
    sender_dir.child("report.pdf").assert("first");
    sender_dir
        .child("20240116140509_report.pdf")
        .assert("second");
}

#[test]
fn test_third_collision_never_overwrites() {
    let root = TempDir::new().unwrap();
    let stamp = Disambiguator::Timestamp(parse_date("15 Jan 2024 09:30:00 +0800").unwrap());

    for body in ["one", "two", "three"] {
        save_attachment(root.path(), "a.txt", body.as_bytes(), &stamp).unwrap();
    }

    root.child("a.txt").assert("one");
    root.child("20240115093000_a.txt").assert("two");
    root.child("20240115093000_a_1.txt").assert("three");
}

#[test]
fn test_undated_collision_uses_message_id() {
    let root = TempDir::new().unwrap();
    let fallback = Disambiguator::MessageId(42);

    save_attachment(root.path(), "notes.txt", b"x", &fallback).unwrap();
    save_attachment(root.path(), "notes.txt", b"y", &fallback).unwrap();

    root.child("id42_notes.txt")
        .assert(predicate::str::contains("y"));
}
