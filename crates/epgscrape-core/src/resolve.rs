//! Clock time and date resolution.
//!
//! Each section of the page starts on its own civil date. Within a
//! section, a clock time smaller than the previous one means the
//! listing crossed midnight, so the day offset advances by one.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::EntryParseError;
use crate::extract::{DayHeader, RawEntry};

/// `HH:MM` / `H.MM` followed by an optional suffix.
#[allow(clippy::expect_used)]
static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})[:.](\d{2})\s*(.*?)\s*$").expect("failed to compile clock regex")
});

/// Programme with an absolute start; stop is derived later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEntry {
    /// Programme title.
    pub title: String,
    /// Absolute start in the source timezone.
    pub start: DateTime<Tz>,
    /// Optional description.
    pub description: Option<String>,
    /// Optional category.
    pub category: Option<String>,
}

/// Parses a 12- or 24-hour clock time.
///
/// Accepts `06:00`, `6.00`, `6:00 pm`, `6:00 p. m.`, `18:00 hrs`.
///
/// # Errors
///
/// Returns [`EntryParseError::InvalidTime`] for out-of-range fields,
/// unknown suffixes, or text that is not a clock time.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime, EntryParseError> {
    let invalid = || EntryParseError::InvalidTime {
        raw: String::from(raw),
    };

    let caps = CLOCK_RE.captures(raw).ok_or_else(invalid)?;
    let hour: u32 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    let minute: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    let suffix: String = caps
        .get(3)
        .map_or("", |m| m.as_str())
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_lowercase)
        .collect();

    let hour = match suffix.as_str() {
        "" | "h" | "hr" | "hrs" => hour,
        "am" if (1..=12).contains(&hour) => hour % 12,
        "pm" if (1..=12).contains(&hour) => (hour % 12).saturating_add(12),
        _ => return Err(invalid()),
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Infers the civil date of a section header relative to `anchor`.
///
/// The page prints only weekday and day of month. Candidates in the
/// previous, current and next month whose weekday matches are
/// considered and the one closest to `anchor` wins. Without a match the
/// anchor month is assumed, then the anchor itself.
///
/// Returns `None` if the header's weekday is unknown.
#[must_use]
pub fn section_date(header: &DayHeader, anchor: NaiveDate) -> Option<NaiveDate> {
    let weekday = header.weekday?;
    let first_of_month = anchor.with_day(1)?;

    let candidates = [
        first_of_month.checked_sub_months(Months::new(1)),
        Some(first_of_month),
        first_of_month.checked_add_months(Months::new(1)),
    ];

    let closest = candidates
        .into_iter()
        .flatten()
        .filter_map(|month| month.with_day(header.day_of_month))
        .filter(|d| d.weekday() == weekday)
        .min_by_key(|d| d.signed_duration_since(anchor).num_days().abs());

    Some(
        closest
            .or_else(|| anchor.with_day(header.day_of_month))
            .unwrap_or(anchor),
    )
}

/// Running rollover state threaded through one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollover {
    /// Last successfully parsed clock time.
    pub last: Option<NaiveTime>,
    /// Days elapsed since the section date.
    pub day_offset: u32,
}

impl Rollover {
    /// Advances the state with the next clock time in page order.
    #[must_use]
    pub fn advance(self, clock: NaiveTime) -> Self {
        let day_offset = match self.last {
            Some(last) if clock < last => self.day_offset.saturating_add(1),
            _ => self.day_offset,
        };
        Self {
            last: Some(clock),
            day_offset,
        }
    }
}

/// Maps a wall-clock time onto `tz`.
///
/// Ambiguous times (DST fold) take the earlier instant; times inside a
/// DST gap are moved forward by one hour.
///
/// # Errors
///
/// Returns [`EntryParseError::NonexistentLocalTime`] if neither mapping exists.
pub fn localize(tz: Tz, local: NaiveDateTime) -> Result<DateTime<Tz>, EntryParseError> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            local
                .checked_add_signed(TimeDelta::hours(1))
                .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
        })
        .ok_or_else(|| EntryParseError::NonexistentLocalTime {
            local,
            tz: String::from(tz.name()),
        })
}

/// Resolves entries that all belong to one section starting on `date`.
struct SectionCursor {
    header: Option<DayHeader>,
    date: Option<NaiveDate>,
    state: Rollover,
}

impl SectionCursor {
    fn open(header: Option<&DayHeader>, anchor: NaiveDate) -> Self {
        let date = header.map_or(Some(anchor), |h| section_date(h, anchor));
        Self {
            header: header.cloned(),
            date,
            state: Rollover::default(),
        }
    }

    fn resolve(&mut self, entry: &RawEntry, tz: Tz) -> Result<DateTime<Tz>, EntryParseError> {
        let date = self.date.ok_or_else(|| EntryParseError::UnknownWeekday {
            name: self
                .header
                .as_ref()
                .map_or_else(String::new, |h| h.weekday_name.clone()),
        })?;
        let clock = parse_clock_time(&entry.raw_time_text)?;
        let next = self.state.advance(clock);

        let day = date
            .checked_add_days(Days::new(u64::from(next.day_offset)))
            .ok_or_else(|| EntryParseError::DateOutOfRange {
                raw: entry.raw_time_text.clone(),
            })?;
        let start = localize(tz, day.and_time(clock))?;

        self.state = next;
        Ok(start)
    }
}

/// Outcome of resolving a page's raw entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Entries with absolute starts, in page order.
    pub entries: Vec<TimedEntry>,
    /// Number of entries dropped because they could not be resolved.
    pub skipped: usize,
}

/// Resolves raw entries to absolute starts in `tz`.
///
/// Entries without a section header are placed on `anchor`. Entries
/// that fail to resolve are logged at WARN and skipped; they do not
/// affect rollover detection of later entries.
#[must_use]
pub fn resolve_entries(raw: &[RawEntry], anchor: NaiveDate, tz: Tz) -> Resolution {
    let mut entries = Vec::with_capacity(raw.len());
    let mut skipped: usize = 0;
    let mut cursor: Option<SectionCursor> = None;

    for entry in raw {
        let section = match cursor.take() {
            Some(c) if c.header == entry.section => c,
            _ => SectionCursor::open(entry.section.as_ref(), anchor),
        };
        let section = cursor.insert(section);

        match section.resolve(entry, tz) {
            Ok(start) => entries.push(TimedEntry {
                title: entry.title_text.clone(),
                start,
                description: entry.raw_description.clone(),
                category: entry.raw_category.clone(),
            }),
            Err(err) => {
                skipped = skipped.saturating_add(1);
                tracing::warn!(
                    title = %entry.title_text,
                    raw_time = %entry.raw_time_text,
                    error = %err,
                    "skipping programme entry"
                );
            }
        }
    }

    Resolution { entries, skipped }
}
