//! Centralized error types for mailpack.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::stats::ExtractionStats;

/// All errors produced by the mailpack library.
#[derive(Error, Debug)]
pub enum PackError {
    /// A store root or folder cannot be opened, connected to, or parsed.
    #[error("Cannot access store '{target}': {reason}")]
    StructuralAccess { target: String, reason: String },

    /// An attachment claims a container scheme that no reader is registered for.
    #[error("Unsupported container scheme: {0}")]
    UnsupportedContainer(String),

    /// A temporary file backing a nested container could not be created or removed.
    #[error("Temporary resource error for '{path}': {source}")]
    Resource {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A node of the output package could not be written.
    #[error("Cannot write archive node '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O error while reading a source, with the associated path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Nested containers go deeper than the configured limit.
    #[error("Container nesting exceeds the limit of {0} levels")]
    DepthExceeded(usize),

    /// A byte-exact message could not be built from the normalized fields.
    #[error("Message synthesis failed: {0}")]
    Synthesis(String),

    /// The job was cancelled through its cancellation token.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, PackError>`.
pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Write` variant from a path and an `io::Error`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a `StructuralAccess` variant.
    pub fn access(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::StructuralAccess {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must abort the whole job, wherever it was raised.
    ///
    /// A partially written package is unusable, and a cancelled job stops everywhere.
    /// Everything else is confined to the subtree or attachment that raised it
    /// once it happens below the extraction root.
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Cancelled)
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `PackError::io`).
impl From<std::io::Error> for PackError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// A recovered problem with one field of one message.
///
/// Native readers return this instead of failing; the message pipeline
/// substitutes a default and logs it at the configured warning level.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// Name of the field that could not be read (`"sent_date"`, `"from"`, …).
    pub field: &'static str,
    /// Human-readable cause.
    pub reason: String,
}

impl ParseWarning {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {}: {}", self.field, self.reason)
    }
}

/// Result of a native getter: either a value or a recoverable warning.
pub type FieldResult<T> = std::result::Result<T, ParseWarning>;

/// Severity at which recovered warnings are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Visible at the default `warn` log level.
    Warning,
    /// Quiet: only shown with `debug` logging.
    #[default]
    Detail,
}

impl WarningLevel {
    /// Log a recovered problem concerning `subject` at this level.
    pub fn report(&self, subject: &str, warning: &dyn fmt::Display) {
        match self {
            Self::Warning => tracing::warn!(subject, "{warning}"),
            Self::Detail => tracing::debug!(subject, "{warning}"),
        }
    }
}

/// A fatal failure of a host-facing operation, together with the statistics
/// accumulated before it happened.
#[derive(Error, Debug)]
#[error("{error} (after {} folder(s), {} message(s))", stats.folders, stats.elements)]
pub struct ExtractionFailure {
    /// Statistics gathered up to the failure.
    pub stats: ExtractionStats,
    /// The typed cause.
    #[source]
    pub error: PackError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_fatal_classification() {
        let write = PackError::write("/tmp/x", std::io::Error::other("disk full"));
        assert!(write.is_job_fatal());
        assert!(PackError::Cancelled.is_job_fatal());
        assert!(!PackError::UnsupportedContainer("pst".into()).is_job_fatal());
        assert!(!PackError::access("mbox:/x", "missing").is_job_fatal());
    }

    #[test]
    fn test_failure_message_carries_stats() {
        let failure = ExtractionFailure {
            stats: ExtractionStats {
                folders: 2,
                elements: 7,
                ..Default::default()
            },
            error: PackError::Cancelled,
        };
        let text = failure.to_string();
        assert!(text.contains("cancelled"));
        assert!(text.contains("2 folder(s)"));
        assert!(text.contains("7 message(s)"));
    }

    #[test]
    fn test_warning_level_default_is_quiet() {
        assert_eq!(WarningLevel::default(), WarningLevel::Detail);
        let parsed: WarningLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, WarningLevel::Warning);
    }

    #[test]
    fn test_parse_warning_display() {
        let w = ParseWarning::new("sent_date", "bad month");
        assert_eq!(w.to_string(), "malformed sent_date: bad month");
    }
}
