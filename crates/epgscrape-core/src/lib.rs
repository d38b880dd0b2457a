//! Schedule page scraper and XMLTV guide generator.
//!
//! Fetches a broadcaster's programming page, extracts the listed
//! programmes, resolves them into an absolute timeline and writes the
//! result as an XMLTV document.

/// Error taxonomy for a pipeline run.
pub mod error;
/// Raw programme extraction from HTML.
pub mod extract;
/// Schedule page retrieval.
pub mod fetch;
/// Non-reentrant execution guard.
pub mod guard;
/// Timeline assembly and guide data model.
pub mod guide;
/// End-to-end pipeline orchestration.
pub mod pipeline;
/// Clock time and date resolution.
pub mod resolve;
/// Atomic output file replacement.
pub mod writer;
/// XMLTV rendering.
pub mod xmltv;

pub use error::{
    BuilderError, EntryParseError, ExtractError, FetchError, GuardError, PipelineError,
    SerializeError, WriteError,
};
pub use extract::{DayHeader, RawEntry, extract};
pub use fetch::{
    DEFAULT_USER_AGENT, FileSource, HttpFetcher, HttpFetcherBuilder, LocalPageSource, PageSource,
};
pub use guard::{RunGuard, RunPermit};
pub use guide::{
    Channel, GuideDocument, LastStop, ParseLastStopError, ResolvedEntry, Timeline, build_timeline,
};
pub use pipeline::{
    GeneratedGuide, Pipeline, PipelineConfig, RunOutcome, RunSummary, anchor_date, render_guide,
};
pub use resolve::{TimedEntry, parse_clock_time, resolve_entries, section_date};
pub use writer::{write_atomic, write_atomic_with};
pub use xmltv::render_xmltv;
