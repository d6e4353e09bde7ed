//! Integration tests for the MBOX splitter, message parsing and header decoding.

use std::path::PathBuf;

use mailpack::parser::header::parse_date;
use mailpack::parser::mbox::MboxParser;
use mailpack::parser::mime::parse_message;

const SIMPLE_MBOX: &str = "\
From alice@example.com Mon Jan 01 10:00:00 2024
From: Alice Smith <alice@example.com>
To: Bob <bob@example.com>
Subject: Hello World
Date: Mon, 01 Jan 2024 10:00:00 +0000
Message-ID: <msg001@example.com>

Hi Bob.

From bob@example.com Tue Jan 02 11:00:00 2024
From: Bob <bob@example.com>
To: Alice Smith <alice@example.com>
Subject: Re: Hello World
Date: Tue, 02 Jan 2024 11:00:00 +0000
Message-ID: <msg002@example.com>
In-Reply-To: <msg001@example.com>
References: <msg001@example.com>

Hi Alice.

From carol@example.com Wed Jan 03 12:00:00 2024
From: Carol <carol@example.com>
To: Alice Smith <alice@example.com>
Subject: =?UTF-8?B?Q2Fmw6kgY29uIGxlw7Fh?=
Date: Wed, 03 Jan 2024 12:00:00 +0000
Message-ID: <msg003@example.com>
Content-Type: text/plain; charset=UTF-8
Content-Transfer-Encoding: 8bit

Caracteres especiales: \u{e1}\u{e9}\u{ed}\u{f3}\u{fa}

From dave@example.com Thu Jan 04 13:00:00 2024
From: Dave <dave@example.com>
To: Alice Smith <alice@example.com>
Subject: Message with From in body
Date: Thu, 04 Jan 2024 13:00:00 +0000
Message-ID: <msg004@example.com>

>From the perspective of the mailbox this is body text.

From erin@example.com Fri Jan 05 14:00:00 2024
From: =?ISO-8859-1?Q?Fran=E7ois?= <francois@example.com>
To: Alice Smith <alice@example.com>
Subject: With attachment
Date: Fri, 05 Jan 2024 14:00:00 +0000
Message-ID: <msg005@example.com>
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=\"b1\"

--b1
Content-Type: text/plain

See attached.
--b1
Content-Type: application/pdf; name=\"report.pdf\"
Content-Disposition: attachment; filename=\"report.pdf\"
Content-Transfer-Encoding: base64

JVBERi0xLjQ=
--b1--
";

fn write_mbox(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn split(path: &PathBuf) -> Vec<Vec<u8>> {
    let parser = MboxParser::new(path).unwrap();
    let mut messages = Vec::new();
    parser
        .parse(&mut |_offset, bytes| {
            messages.push(bytes.to_vec());
            true
        })
        .unwrap();
    messages
}

// ─── Splitting ──────────────────────────────────────────────────────

#[test]
fn test_parse_simple_mbox_count() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    assert_eq!(split(&path).len(), 5, "simple.mbox should contain exactly 5 messages");
}

#[test]
fn test_parse_empty_mbox() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "empty.mbox", "");
    let parser = MboxParser::new(&path).unwrap();
    let mut count: u64 = 0;
    let delivered = parser
        .parse(&mut |_offset, _bytes| {
            count += 1;
            true
        })
        .unwrap();
    assert_eq!(delivered, 0);
    assert_eq!(count, 0);
}

#[test]
fn test_stop_early() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let parser = MboxParser::new(&path).unwrap();
    let mut seen = 0;
    parser
        .parse(&mut |_offset, _bytes| {
            seen += 1;
            seen < 2
        })
        .unwrap();
    assert_eq!(seen, 2);
}

#[test]
fn test_missing_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(MboxParser::new(tmp.path().join("absent.mbox")).is_err());
}

// ─── Message fields ─────────────────────────────────────────────────

#[test]
fn test_first_message_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);
    let first = parse_message(&messages[0]);

    assert_eq!(first.subject.as_deref(), Some("Hello World"));
    assert_eq!(first.message_id.as_deref(), Some("<msg001@example.com>"));
    let from = first.from.as_ref().unwrap();
    assert_eq!(from.address, "alice@example.com");
    assert_eq!(from.display_name, "Alice Smith");
    assert_eq!(first.to.len(), 1);
    assert_eq!(first.to[0].address, "bob@example.com");
    assert!(matches!(first.sent_date, Ok(Some(_))));
    assert!(first.structure_warning.is_none());
}

#[test]
fn test_raw_bytes_exclude_separator() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);
    let first = parse_message(&messages[0]);
    assert!(first.raw.starts_with(b"From: Alice Smith"));
}

#[test]
fn test_from_line_in_body_is_not_a_separator() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);
    let fourth = parse_message(&messages[3]);
    assert_eq!(fourth.subject.as_deref(), Some("Message with From in body"));
    let text = fourth.bodies.text.as_deref().unwrap_or("");
    assert!(
        text.contains("From the perspective"),
        "Body should keep the From line, got: '{text}'"
    );
}

#[test]
fn test_threading_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);
    let second = parse_message(&messages[1]);
    assert_eq!(second.subject.as_deref(), Some("Re: Hello World"));
    assert_eq!(second.in_reply_to.as_deref(), Some("<msg001@example.com>"));
    assert_eq!(second.references, vec!["<msg001@example.com>".to_string()]);
}

#[test]
fn test_charset_decoding() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);

    let third = parse_message(&messages[2]);
    assert_eq!(third.subject.as_deref(), Some("Caf\u{e9} con le\u{f1}a"));
    let text = third.bodies.text.as_deref().unwrap_or("");
    assert!(text.contains("\u{e1}\u{e9}\u{ed}\u{f3}\u{fa}"), "got: '{text}'");

    let fifth = parse_message(&messages[4]);
    let from = fifth.from.as_ref().unwrap();
    assert!(from.display_name.contains("Fran"), "got: '{}'", from.display_name);
}

#[test]
fn test_attachment_is_described() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_mbox(&tmp, "simple.mbox", SIMPLE_MBOX);
    let messages = split(&path);
    let fifth = parse_message(&messages[4]);
    assert_eq!(fifth.attachments.len(), 1);
    let pdf = &fifth.attachments[0];
    assert_eq!(pdf.name.as_deref(), Some("report.pdf"));
    assert_eq!(pdf.content, b"%PDF-1.4".to_vec());
    assert!(fifth.bodies.text.as_deref().unwrap_or("").contains("See attached."));
}

// ─── Dates ──────────────────────────────────────────────────────────

#[test]
fn test_date_parsing_formats() {
    assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000").is_some());
    assert!(parse_date("04 Jan 2024 10:00:00 +0000").is_some());
    assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    assert!(parse_date("").is_none());
    assert!(parse_date("not a date").is_none());
}
