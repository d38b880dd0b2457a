//! Error types for each pipeline stage.
//!
//! Run-level failures abort the run before the output file is touched.
//! [`EntryParseError`] is the only recoverable kind: the affected entry
//! is dropped and the run continues.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Schedule page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connection refused, DNS, TLS, body read).
    #[error("request to {url} failed after {attempts} attempt(s)")]
    Transport {
        /// Requested URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// No response within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s ({attempts} attempt(s))")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Per-attempt timeout in seconds.
        timeout_secs: u64,
        /// Number of attempts made.
        attempts: u32,
    },
    /// Server answered with a non-success status.
    #[error("{url} returned HTTP {status} ({attempts} attempt(s))")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Number of attempts made.
        attempts: u32,
    },
    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    /// Local source file could not be read.
    #[error("failed to read {}", .path.display())]
    File {
        /// Source file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Page structure is not recognisable as a schedule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// No day section header was found anywhere on the page.
    #[error("no schedule section found in page ({lines} text lines scanned)")]
    ScheduleNotFound {
        /// Number of text lines examined.
        lines: usize,
    },
}

/// A single entry could not be resolved; the entry is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryParseError {
    /// Clock time text is not a valid 12- or 24-hour time.
    #[error("unrecognised clock time {raw:?}")]
    InvalidTime {
        /// Offending text.
        raw: String,
    },
    /// Section header names a weekday that is not recognised.
    #[error("unknown weekday {name:?} in section header")]
    UnknownWeekday {
        /// Weekday text as it appeared on the page.
        name: String,
    },
    /// Local date-time falls in a gap of the source timezone.
    #[error("local time {local} does not exist in {tz}")]
    NonexistentLocalTime {
        /// Wall-clock date-time.
        local: NaiveDateTime,
        /// IANA timezone name.
        tz: String,
    },
    /// Day rollover went past the representable date range.
    #[error("date out of range resolving {raw:?}")]
    DateOutOfRange {
        /// Clock time text being resolved.
        raw: String,
    },
}

/// Resolved entries do not form a publishable timeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    /// Nothing usable survived parsing.
    #[error("timeline is empty ({candidates} candidate entries)")]
    EmptyTimeline {
        /// Entries handed to the builder.
        candidates: usize,
    },
    /// The last entry's stop could not be computed.
    #[error("cannot compute stop time for the last programme starting at {start}")]
    StopOutOfRange {
        /// Start of the last programme (RFC 3339).
        start: String,
    },
}

/// XMLTV document could not be rendered.
#[derive(Debug, Error)]
#[error("failed to render XMLTV document: {message}")]
pub struct SerializeError {
    /// Writer error text.
    pub message: String,
}

/// Output file could not be replaced.
#[derive(Debug, Error)]
#[error("failed to {op} {}", .path.display())]
pub struct WriteError {
    /// Operation that failed.
    pub op: &'static str,
    /// Path involved.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Execution guard could not be evaluated.
#[derive(Debug, Error)]
#[error("failed to lock {}", .path.display())]
pub struct GuardError {
    /// Lock file path.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Run-level failure. The output file is left untouched.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// See [`FetchError`].
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// See [`ExtractError`].
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// See [`BuilderError`].
    #[error(transparent)]
    Builder(#[from] BuilderError),
    /// See [`SerializeError`].
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// See [`WriteError`].
    #[error(transparent)]
    Write(#[from] WriteError),
    /// See [`GuardError`].
    #[error(transparent)]
    Guard(#[from] GuardError),
}
