//! End-to-end pipeline: fetch, extract, resolve, build, render, write.
#![allow(clippy::future_not_send)]

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::instrument;

use crate::error::PipelineError;
use crate::extract::extract;
use crate::fetch::LocalPageSource;
use crate::guard::RunGuard;
use crate::guide::{Channel, GuideDocument, LastStop, build_timeline};
use crate::resolve::resolve_entries;
use crate::writer::write_atomic;
use crate::xmltv::render_xmltv;

/// Explicit per-run configuration for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Channel identity written to the guide.
    pub channel: Channel,
    /// Language tag for text elements.
    pub lang: String,
    /// Source timezone the page's clock times are in.
    pub timezone: Tz,
    /// Destination of the guide document.
    pub output_file: PathBuf,
    /// Stop policy for the last programme.
    pub last_stop: LastStop,
}

/// A rendered guide that has not been written yet.
#[derive(Debug, Clone)]
pub struct GeneratedGuide {
    /// Guide data model.
    pub document: GuideDocument,
    /// Serialized XMLTV document.
    pub bytes: Vec<u8>,
    /// Raw entries found on the page.
    pub extracted: usize,
    /// Entries dropped because their time could not be resolved.
    pub skipped: usize,
}

impl GeneratedGuide {
    /// Summarises this guide as if written to `output_file`.
    #[must_use]
    pub fn summary(&self, output_file: PathBuf) -> RunSummary {
        let timeline = &self.document.timeline;
        RunSummary {
            programmes: timeline.len(),
            extracted: self.extracted,
            skipped: self.skipped,
            first_start: timeline.first_start().map(DateTime::fixed_offset),
            last_stop: timeline.last_stop().map(DateTime::fixed_offset),
            output_file,
            bytes: self.bytes.len(),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Programmes in the written timeline.
    pub programmes: usize,
    /// Raw entries found on the page.
    pub extracted: usize,
    /// Entries skipped during time resolution.
    pub skipped: usize,
    /// Start of the first programme.
    pub first_start: Option<DateTime<chrono::FixedOffset>>,
    /// Stop of the last programme.
    pub last_stop: Option<DateTime<chrono::FixedOffset>>,
    /// Written file.
    pub output_file: PathBuf,
    /// Size of the written document.
    pub bytes: usize,
}

/// Outcome of a guarded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run executed and wrote the guide.
    Completed(RunSummary),
    /// Another run held the guard; nothing was done.
    Skipped,
}

/// Civil date in `tz` at instant `now`; the date the page is assumed to show.
#[must_use]
pub fn anchor_date(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Turns page HTML into a rendered guide without any I/O.
///
/// # Errors
///
/// - [`PipelineError::Extract`] if the page has no schedule.
/// - [`PipelineError::Builder`] if no entry could be resolved.
/// - [`PipelineError::Serialize`] if rendering fails.
pub fn render_guide(
    html: &str,
    anchor: NaiveDate,
    config: &PipelineConfig,
) -> Result<GeneratedGuide, PipelineError> {
    let raw = extract(html)?;
    tracing::info!(entries = raw.len(), "Programme entries extracted");

    let resolution = resolve_entries(&raw, anchor, config.timezone);
    let timeline = build_timeline(resolution.entries, config.last_stop)?;

    let document = GuideDocument {
        channel: config.channel.clone(),
        timeline,
        lang: config.lang.clone(),
    };
    let bytes = render_xmltv(&document)?;

    Ok(GeneratedGuide {
        document,
        bytes,
        extracted: raw.len(),
        skipped: resolution.skipped,
    })
}

/// Pipeline bound to a page source and a configuration.
#[derive(Debug)]
pub struct Pipeline<S> {
    source: S,
    config: PipelineConfig,
}

impl<S: LocalPageSource + Sync> Pipeline<S> {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(source: S, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches the page and renders the guide, without writing it.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching, extraction, building or rendering fails.
    pub async fn generate(&self, anchor: NaiveDate) -> Result<GeneratedGuide, PipelineError> {
        let result = self.generate_unlogged(anchor).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Guide generation failed");
        }
        result
    }

    #[instrument(skip_all, fields(source = %self.source.describe(), anchor = %anchor))]
    async fn generate_unlogged(&self, anchor: NaiveDate) -> Result<GeneratedGuide, PipelineError> {
        let html = self.source.fetch_page().await?;
        render_guide(&html, anchor, &self.config)
    }

    /// Runs the full pipeline and replaces the output file.
    ///
    /// On error the previous output file is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails.
    pub async fn run(&self, anchor: NaiveDate) -> Result<RunSummary, PipelineError> {
        let result = self.run_unlogged(anchor).await;
        match &result {
            Ok(summary) => tracing::info!(
                programmes = summary.programmes,
                skipped = summary.skipped,
                first_start = ?summary.first_start,
                last_stop = ?summary.last_stop,
                path = %summary.output_file.display(),
                bytes = summary.bytes,
                "Guide written"
            ),
            Err(e) => tracing::error!(error = %e, "Pipeline run failed"),
        }
        result
    }

    async fn run_unlogged(&self, anchor: NaiveDate) -> Result<RunSummary, PipelineError> {
        let guide = self.generate_unlogged(anchor).await?;
        write_atomic(&self.config.output_file, &guide.bytes)?;
        Ok(guide.summary(self.config.output_file.clone()))
    }

    /// Runs the pipeline unless another run holds `guard`.
    ///
    /// # Errors
    ///
    /// Returns an error if the guard cannot be checked or the run fails.
    pub async fn run_guarded(
        &self,
        guard: &RunGuard,
        anchor: NaiveDate,
    ) -> Result<RunOutcome, PipelineError> {
        let Some(_permit) = guard.try_acquire()? else {
            tracing::warn!(
                lock = %guard.lock_path().display(),
                "Another run is in progress, skipping"
            );
            return Ok(RunOutcome::Skipped);
        };
        self.run(anchor).await.map(RunOutcome::Completed)
    }
}
