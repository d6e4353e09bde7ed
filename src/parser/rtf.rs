//! Rich Text Format helpers.
//!
//! Mail clients that store bodies as RTF often encapsulate the original HTML
//! or plain text (`\fromhtml1` / `\fromtext`). [`de_encapsulate`] restores that
//! original; [`rtf_to_text`] is a best-effort plain-text rendering of any RTF.

/// The original body recovered from encapsulated RTF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encapsulated {
    Html(String),
    Text(String),
}

/// Destinations whose content is never visible text.
const IGNORED_DESTINATIONS: [&str; 18] = [
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "object",
    "header",
    "footer",
    "listtable",
    "listoverridetable",
    "generator",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "xmlnstbl",
    "rsidtbl",
    "filetbl",
];

/// How far into the document to look for the encapsulation marker.
const HEADER_SCAN_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Html,
    Text,
    Plain,
}

/// Recover the HTML or plain text encapsulated in an RTF body.
///
/// Returns `None` when the input is not RTF or carries no encapsulation marker.
pub fn de_encapsulate(rtf: &str) -> Option<Encapsulated> {
    let trimmed = rtf.trim_start();
    if !trimmed.starts_with("{\\rtf") {
        return None;
    }
    let head: String = trimmed.chars().take(HEADER_SCAN_LIMIT).collect();
    if head.contains("\\fromhtml") {
        Some(Encapsulated::Html(walk(trimmed, Mode::Html)))
    } else if head.contains("\\fromtext") {
        Some(Encapsulated::Text(walk(trimmed, Mode::Text).trim_end().to_string()))
    } else {
        None
    }
}

/// Plain text of an RTF document: visible text only, paragraphs as newlines.
pub fn rtf_to_text(rtf: &str) -> String {
    walk(rtf.trim_start(), Mode::Plain).trim().to_string()
}

#[derive(Debug, Clone, Copy)]
struct GroupState {
    /// Content of this group is discarded.
    skip: bool,
    /// Inside `{\*\htmltag ...}`: content is part of the original HTML.
    html_tag: bool,
    /// `\htmlrtf` is on: RTF-only rendering content, not part of the original.
    suppressed: bool,
    /// Fallback characters following each `\uN`.
    uc: usize,
}

struct Walker {
    mode: Mode,
    out: String,
    group: GroupState,
    stack: Vec<GroupState>,
    at_group_start: bool,
    starred: bool,
    skip_chars: usize,
}

impl Walker {
    fn emit(&mut self, s: &str) {
        if self.group.skip {
            return;
        }
        if self.mode != Mode::Plain && self.group.suppressed && !self.group.html_tag {
            return;
        }
        self.out.push_str(s);
    }

    fn emit_char(&mut self, c: char) {
        if self.skip_chars > 0 {
            self.skip_chars -= 1;
            return;
        }
        let mut buf = [0u8; 4];
        self.emit(c.encode_utf8(&mut buf));
    }

    fn control_word(&mut self, word: &str, param: Option<i32>) {
        if self.at_group_start {
            self.at_group_start = false;
            if self.starred {
                if word == "htmltag" && self.mode == Mode::Html && !self.group.skip {
                    self.group.html_tag = true;
                } else {
                    self.group.skip = true;
                }
                return;
            }
            if IGNORED_DESTINATIONS.contains(&word) {
                self.group.skip = true;
                return;
            }
        }

        match word {
            "htmlrtf" => self.group.suppressed = param != Some(0),
            "par" | "line" => self.emit("\n"),
            "tab" => self.emit("\t"),
            "emdash" => self.emit("\u{2014}"),
            "endash" => self.emit("\u{2013}"),
            "lquote" => self.emit("\u{2018}"),
            "rquote" => self.emit("\u{2019}"),
            "ldblquote" => self.emit("\u{201C}"),
            "rdblquote" => self.emit("\u{201D}"),
            "bullet" => self.emit("\u{2022}"),
            "uc" => self.group.uc = param.unwrap_or(1).max(0) as usize,
            "u" => {
                if let Some(value) = param {
                    let code = if value < 0 { value + 65536 } else { value } as u32;
                    self.skip_chars = 0;
                    self.emit_char(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    self.skip_chars = self.group.uc;
                }
            }
            _ => {}
        }
    }
}

fn walk(rtf: &str, mode: Mode) -> String {
    let chars: Vec<char> = rtf.chars().collect();
    let mut w = Walker {
        mode,
        out: String::with_capacity(rtf.len() / 2),
        group: GroupState {
            skip: false,
            html_tag: false,
            suppressed: false,
            uc: 1,
        },
        stack: Vec::new(),
        at_group_start: false,
        starred: false,
        skip_chars: 0,
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                w.stack.push(w.group);
                w.at_group_start = true;
                w.starred = false;
                i += 1;
            }
            '}' => {
                if let Some(previous) = w.stack.pop() {
                    w.group = previous;
                }
                w.at_group_start = false;
                w.starred = false;
                i += 1;
            }
            '\r' | '\n' => i += 1,
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else {
                    break;
                };
                if next.is_ascii_alphabetic() {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    let param_start = i;
                    if i < chars.len() && chars[i] == '-' {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let param = chars[param_start..i]
                        .iter()
                        .collect::<String>()
                        .parse::<i32>()
                        .ok();
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }
                    w.control_word(&word, param);
                } else {
                    i += 1;
                    match next {
                        '*' => {
                            if w.at_group_start {
                                w.starred = true;
                            }
                        }
                        '\'' => {
                            let hex: String = chars.iter().skip(i).take(2).collect();
                            i += hex.len();
                            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                let bytes = [byte];
                                let (decoded, _) =
                                    encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
                                if let Some(ch) = decoded.chars().next() {
                                    w.at_group_start = false;
                                    w.emit_char(ch);
                                }
                            }
                        }
                        '\\' | '{' | '}' => {
                            w.at_group_start = false;
                            w.emit_char(next);
                        }
                        '~' => w.emit_char('\u{00A0}'),
                        '_' => w.emit_char('-'),
                        '\r' | '\n' => w.emit("\n"),
                        _ => {}
                    }
                }
            }
            _ => {
                w.at_group_start = false;
                w.emit_char(c);
                i += 1;
            }
        }
    }
    w.out
}
