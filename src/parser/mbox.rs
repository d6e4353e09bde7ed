//! Streaming MBOX splitter.
//!
//! Reads MBOX files line by line through a large buffer and never loads the
//! whole file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PackError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Streaming MBOX parser.
///
/// Walks the file sequentially and hands every message to a callback. Tolerates:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackError::access(path.display(), "file not found")
            } else {
                PackError::io(&path, e)
            }
        })?;
        if !metadata.is_file() {
            return Err(PackError::access(path.display(), "not a regular file"));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Override the per-message size limit.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk the MBOX, calling `message_callback` for each message found.
    ///
    /// The callback receives `(offset, message_bytes)` where the bytes exclude
    /// the `From ` separator line and the blank line that precedes the next
    /// separator. It returns `true` to continue or `false` to stop early.
    ///
    /// Returns the number of messages delivered.
    pub fn parse(&self, message_callback: &mut dyn FnMut(u64, &[u8]) -> bool) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| PackError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start: u64 = 0;
        let mut in_message = false;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut truncated = false;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            // Lines may straddle buffer refills: keep reading until newline or EOF.
            loop {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| PackError::io(&self.path, e))?;
                if buf.is_empty() {
                    break;
                }
                let (consume_len, complete) = match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (buf.len(), false),
                };
                line_buf.extend_from_slice(&buf[..consume_len]);
                reader.consume(consume_len);
                if complete {
                    break;
                }
            }
            if line_buf.is_empty() {
                break;
            }
            let line_len = line_buf.len() as u64;

            if is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        path = %self.path.display(),
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if in_message {
                    if !message_callback(message_start, trim_separator_blank(&message_buf)) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = current_offset;
                message_buf.clear();
                in_message = true;
                truncated = false;
            } else if first_line {
                debug!(path = %self.path.display(), "MBOX does not start with a separator line");
                in_message = true;
                message_buf.extend_from_slice(&line_buf);
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len;
        }

        if in_message && message_callback(message_start, trim_separator_blank(&message_buf)) {
            count += 1;
        }

        Ok(count)
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
pub fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Remove the leading `From ` line of a single stored message, if any.
pub fn strip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Drop the single blank line MBOX writers put before the next separator.
fn trim_separator_blank(message: &[u8]) -> &[u8] {
    if let Some(rest) = message.strip_suffix(b"\r\n\r\n") {
        return &message[..rest.len() + 2];
    }
    if let Some(rest) = message.strip_suffix(b"\n\n") {
        return &message[..rest.len() + 1];
    }
    message
}

fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_mbox(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n"));
        assert!(!is_mbox_separator(b">From user@example.com\n"));
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_strip_from_line() {
        assert_eq!(strip_from_line(b"From a@b Mon\nSubject: x\n"), b"Subject: x\n");
        assert_eq!(strip_from_line(b"Subject: x\n"), b"Subject: x\n");
    }

    #[test]
    fn test_split_messages() {
        let file = write_mbox(
            b"From a@example.org Mon Jan  1 00:00:00 2024\nSubject: one\n\nBody 1\n>From quoted\n\nFrom b@example.org Mon Jan  1 00:00:00 2024\nSubject: two\n\nBody 2\n",
        );
        let parser = MboxParser::new(file.path()).unwrap();
        let mut messages: Vec<(u64, Vec<u8>)> = Vec::new();
        let count = parser
            .parse(&mut |offset, bytes| {
                messages.push((offset, bytes.to_vec()));
                true
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(messages[0].0, 0);
        assert_eq!(messages[0].1, b"Subject: one\n\nBody 1\n>From quoted\n");
        assert_eq!(messages[1].1, b"Subject: two\n\nBody 2\n");
    }

    #[test]
    fn test_stop_early() {
        let file = write_mbox(b"From a\nSubject: 1\n\nx\n\nFrom b\nSubject: 2\n\ny\n");
        let parser = MboxParser::new(file.path()).unwrap();
        let count = parser.parse(&mut |_, _| false).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_empty_file() {
        let file = write_mbox(b"");
        let parser = MboxParser::new(file.path()).unwrap();
        assert_eq!(parser.parse(&mut |_, _| true).unwrap(), 0);
    }

    #[test]
    fn test_missing_file_is_structural() {
        let err = MboxParser::new("/nonexistent/mailpack/x.mbox").err().unwrap();
        assert!(matches!(err, PackError::StructuralAccess { .. }));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\r\n"));
        assert!(!is_blank_line(b"x\n"));
    }
}
