//! Normalized message fields, independent of the source format.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;

/// The three body variants a message may carry.
///
/// Empty strings and `None` are treated alike: a variant is present only
/// when it has non-whitespace content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyVariants {
    pub text: Option<String>,
    pub html: Option<String>,
    /// Rich text (RTF), possibly encapsulating an HTML or text original.
    pub rtf: Option<String>,
}

impl BodyVariants {
    pub fn text(&self) -> Option<&str> {
        non_empty(&self.text)
    }

    pub fn html(&self) -> Option<&str> {
        non_empty(&self.html)
    }

    pub fn rtf(&self) -> Option<&str> {
        non_empty(&self.rtf)
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none() && self.html().is_none() && self.rtf().is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Calendar data attached to a meeting request or appointment item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Appointment {
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub organizer: Option<EmailAddress>,
    /// Free-text recurrence description, as given by the source.
    pub recurrence: Option<String>,
}

/// Every field the archive keeps about one message, with defaults applied.
#[derive(Debug, Clone, Default)]
pub struct MessageFields {
    pub subject: String,
    /// Message-ID exactly as found (usually `<id@host>`); never regenerated.
    pub message_id: Option<String>,
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub return_path: Option<String>,
    pub sent_date: Option<DateTime<Utc>>,
    pub received_date: Option<DateTime<Utc>>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub bodies: BodyVariants,
    pub appointment: Option<Appointment>,
    /// Header lines captured from the source, in order, used as the baseline
    /// when a byte-exact message has to be synthesized.
    pub raw_headers: Vec<(String, String)>,
}
