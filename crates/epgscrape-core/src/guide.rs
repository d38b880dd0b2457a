//! Guide data model and timeline assembly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use thiserror::Error;

use crate::error::BuilderError;
use crate::resolve::{TimedEntry, localize};

/// Channel identity, fixed by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// XMLTV channel id.
    pub id: String,
    /// Human-readable channel name.
    pub display_name: String,
}

/// Programme with a fully resolved time slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// Programme title.
    pub title: String,
    /// Absolute start.
    pub start: DateTime<Tz>,
    /// Absolute stop, strictly after `start`.
    pub stop: DateTime<Tz>,
    /// Optional description.
    pub description: Option<String>,
    /// Optional category.
    pub category: Option<String>,
}

/// Ordered, non-overlapping programmes for one channel.
///
/// Starts are strictly increasing and each stop equals the next start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<ResolvedEntry>,
}

impl Timeline {
    /// Programmes in ascending start order.
    #[must_use]
    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    /// Number of programmes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the timeline has no programmes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start of the first programme.
    #[must_use]
    pub fn first_start(&self) -> Option<&DateTime<Tz>> {
        self.entries.first().map(|e| &e.start)
    }

    /// Stop of the last programme.
    #[must_use]
    pub fn last_stop(&self) -> Option<&DateTime<Tz>> {
        self.entries.last().map(|e| &e.stop)
    }
}

/// A channel and its timeline; the unit rendered to XMLTV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideDocument {
    /// Channel block.
    pub channel: Channel,
    /// Programme blocks.
    pub timeline: Timeline,
    /// Language tag for text elements (e.g. `es`).
    pub lang: String,
}

/// Stop policy for the last programme, which has no successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastStop {
    /// Ends at 00:00 of the following civil day.
    #[default]
    Midnight,
    /// Ends a fixed duration after its start.
    Fixed(TimeDelta),
}

impl LastStop {
    /// Computes the stop for a programme starting at `start`.
    #[must_use]
    pub fn stop_for(&self, start: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Self::Midnight => {
                let next_day = start.date_naive().succ_opt()?;
                localize(start.timezone(), next_day.and_hms_opt(0, 0, 0)?).ok()
            }
            Self::Fixed(duration) => start.checked_add_signed(*duration),
        }
    }
}

/// Invalid `LAST_PROGRAMME_DURATION` value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid last programme duration {0:?} (expected \"midnight\" or a positive number of minutes)")]
pub struct ParseLastStopError(String);

impl FromStr for LastStop {
    type Err = ParseLastStopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("midnight") {
            return Ok(Self::Midnight);
        }
        match trimmed.parse::<i64>() {
            Ok(minutes) if minutes > 0 => TimeDelta::try_minutes(minutes)
                .map(Self::Fixed)
                .ok_or_else(|| ParseLastStopError(String::from(s))),
            _ => Err(ParseLastStopError(String::from(s))),
        }
    }
}

impl fmt::Display for LastStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Midnight => write!(f, "midnight"),
            Self::Fixed(duration) => write!(f, "{}", duration.num_minutes()),
        }
    }
}

/// Assembles resolved starts into a [`Timeline`].
///
/// 1. Sorts stably by start if the page was out of order.
/// 2. Keeps the first of several entries sharing a start; an identical
///    `(title, start)` pair is a plain duplicate, a different title is a
///    collision and is logged at WARN.
/// 3. Sets each stop to the next start, and the last one per `last_stop`.
///
/// # Errors
///
/// - [`BuilderError::EmptyTimeline`] if no entries are given.
/// - [`BuilderError::StopOutOfRange`] if the last stop cannot be computed.
pub fn build_timeline(
    mut entries: Vec<TimedEntry>,
    last_stop: LastStop,
) -> Result<Timeline, BuilderError> {
    let candidates = entries.len();

    if !entries.is_sorted_by_key(|e| e.start) {
        tracing::debug!("page listed programmes out of order, sorting");
        entries.sort_by_key(|e| e.start);
    }

    let mut kept: Vec<TimedEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(prev) = kept.last()
            && prev.start == entry.start
        {
            if prev.title == entry.title {
                tracing::debug!(title = %entry.title, start = %entry.start, "duplicate programme removed");
            } else {
                tracing::warn!(
                    kept = %prev.title,
                    dropped = %entry.title,
                    start = %entry.start,
                    "programmes share a start time, keeping the first"
                );
            }
            continue;
        }
        kept.push(entry);
    }

    let Some(last) = kept.last() else {
        return Err(BuilderError::EmptyTimeline { candidates });
    };
    let final_stop = last_stop
        .stop_for(&last.start)
        .filter(|stop| *stop > last.start)
        .ok_or_else(|| BuilderError::StopOutOfRange {
            start: last.start.to_rfc3339(),
        })?;

    let next_starts: Vec<DateTime<Tz>> = kept
        .iter()
        .skip(1)
        .map(|e| e.start)
        .chain(std::iter::once(final_stop))
        .collect();

    let resolved = kept
        .into_iter()
        .zip(next_starts)
        .map(|(e, stop)| ResolvedEntry {
            title: e.title,
            start: e.start,
            stop,
            description: e.description,
            category: e.category,
        })
        .collect();

    Ok(Timeline { entries: resolved })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::Monterrey;
    use tracing::subscriber::with_default;
    use tracing_mock::{expect, subscriber};

    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        Monterrey
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 8, day)
                    .unwrap()
                    .and_hms_opt(hour, minute, 0)
                    .unwrap(),
            )
            .unwrap()
    }

    fn timed(title: &str, start: DateTime<Tz>) -> TimedEntry {
        TimedEntry {
            title: String::from(title),
            start,
            description: None,
            category: None,
        }
    }

    #[test]
    fn test_build_sets_stop_from_next_start() {
        // Arrange
        let entries = vec![
            timed("A", at(1, 6, 0)),
            timed("B", at(1, 9, 0)),
            timed("C", at(1, 12, 0)),
        ];

        // Act
        let timeline = build_timeline(entries, LastStop::Midnight).unwrap();

        // Assert
        let e = timeline.entries();
        assert_eq!(e.len(), 3);
        for pair in e.windows(2) {
            assert_eq!(pair[0].stop, pair[1].start);
            assert!(pair[0].start < pair[0].stop);
        }
        assert_eq!(e[2].stop, at(2, 0, 0));
    }

    #[test]
    fn test_build_fixed_last_duration() {
        // Arrange
        let entries = vec![timed("A", at(1, 23, 30))];

        // Act
        let timeline =
            build_timeline(entries, LastStop::Fixed(TimeDelta::minutes(90))).unwrap();

        // Assert
        assert_eq!(timeline.last_stop(), Some(&at(2, 1, 0)));
    }

    #[test]
    fn test_build_collapses_duplicates() {
        // Arrange
        let entries = vec![
            timed("A", at(1, 6, 0)),
            timed("B", at(1, 8, 0)),
            timed("B", at(1, 8, 0)),
            timed("C", at(1, 10, 0)),
        ];

        // Act
        let timeline = build_timeline(entries, LastStop::Midnight).unwrap();

        // Assert
        let titles: Vec<&str> = timeline.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_build_same_start_keeps_first_title() {
        // Arrange
        let entries = vec![timed("A", at(1, 6, 0)), timed("Other", at(1, 6, 0))];

        // Act
        let timeline = build_timeline(entries, LastStop::Midnight).unwrap();

        // Assert
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.entries()[0].title, "A");
    }

    #[test]
    fn test_build_same_start_collision_warns_once() {
        // Arrange
        let entries = vec![
            timed("A", at(1, 6, 0)),
            timed("Other", at(1, 6, 0)),
            timed("B", at(1, 8, 0)),
        ];
        let (subscriber, handle) = subscriber::mock()
            .event(
                expect::event()
                    .at_level(tracing::Level::WARN)
                    .with_fields(expect::msg("programmes share a start time, keeping the first")),
            )
            .only()
            .with_filter(|meta| *meta.level() <= tracing::Level::WARN)
            .run_with_handle();

        // Act
        let timeline = with_default(subscriber, || build_timeline(entries, LastStop::Midnight));

        // Assert
        assert_eq!(timeline.unwrap().len(), 2);
        handle.assert_finished();
    }

    #[test]
    fn test_build_plain_duplicate_does_not_warn() {
        // Arrange
        let entries = vec![
            timed("A", at(1, 6, 0)),
            timed("A", at(1, 6, 0)),
            timed("B", at(1, 8, 0)),
        ];
        let (subscriber, handle) = subscriber::mock()
            .only()
            .with_filter(|meta| *meta.level() <= tracing::Level::WARN)
            .run_with_handle();

        // Act
        let timeline = with_default(subscriber, || build_timeline(entries, LastStop::Midnight));

        // Assert
        assert_eq!(timeline.unwrap().len(), 2);
        handle.assert_finished();
    }

    #[test]
    fn test_build_sorts_out_of_order_input() {
        // Arrange
        let entries = vec![
            timed("B", at(1, 9, 0)),
            timed("A", at(1, 6, 0)),
            timed("C", at(1, 12, 0)),
        ];

        // Act
        let timeline = build_timeline(entries, LastStop::Midnight).unwrap();

        // Assert
        assert_eq!(timeline.first_start(), Some(&at(1, 6, 0)));
        assert_eq!(timeline.entries()[0].stop, at(1, 9, 0));
    }

    #[test]
    fn test_build_empty_is_error() {
        // Arrange & Act
        let result = build_timeline(Vec::new(), LastStop::Midnight);

        // Assert
        assert_eq!(result, Err(BuilderError::EmptyTimeline { candidates: 0 }));
    }

    #[test]
    fn test_last_stop_midnight_from_midnight_start() {
        // Arrange & Act
        let stop = LastStop::Midnight.stop_for(&at(1, 0, 0)).unwrap();

        // Assert
        assert_eq!(stop, at(2, 0, 0));
    }

    #[test]
    fn test_last_stop_from_str() {
        // Arrange & Act & Assert
        assert_eq!("midnight".parse::<LastStop>(), Ok(LastStop::Midnight));
        assert_eq!(" Midnight ".parse::<LastStop>(), Ok(LastStop::Midnight));
        assert_eq!(
            "45".parse::<LastStop>(),
            Ok(LastStop::Fixed(TimeDelta::minutes(45)))
        );
        assert!("0".parse::<LastStop>().is_err());
        assert!("-5".parse::<LastStop>().is_err());
        assert!("soon".parse::<LastStop>().is_err());
    }

    #[test]
    fn test_last_stop_display_roundtrips_config_value() {
        // Arrange & Act & Assert
        assert_eq!(LastStop::Midnight.to_string(), "midnight");
        assert_eq!(LastStop::Fixed(TimeDelta::minutes(30)).to_string(), "30");
    }
}
