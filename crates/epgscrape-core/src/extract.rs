//! Raw programme extraction.
//!
//! The page is flattened into trimmed text lines (script and style
//! content excluded), then scanned by a small state machine:
//!
//! ```text
//! Programación de Jueves 1      <- day section header
//! 06:00                         <- clock time
//! Las Noticias                  <- title
//! Revista matutina              <- description (optional)
//! Categoría: Noticias           <- category (optional)
//! 09:00 Hoy en Multimedios      <- time and title on one line
//! ```
//!
//! Times are only matched loosely here; strict validation happens in
//! [`crate::resolve`].

use std::sync::LazyLock;

use chrono::Weekday;
use regex::Regex;
use scraper::{Html, Node};
use unicode_normalization::UnicodeNormalization;

use crate::error::ExtractError;

/// Elements whose text never belongs to the visible schedule.
const IGNORED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Day section header, e.g. `Programación de Jueves 1`.
#[allow(clippy::expect_used)]
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)programaci[oó]n\s+de[l]?\s+(\p{L}+)\s+(\d{1,2})\b")
        .expect("failed to compile section regex")
});

/// Leading clock-time token, e.g. `06:00`, `6.30`.
#[allow(clippy::expect_used)]
static TIME_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}[:.]\d{2})(\D.*)?$").expect("failed to compile time regex")
});

/// `Categoría: ...` / `Género: ...` annotation line.
#[allow(clippy::expect_used)]
static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:categor[ií]a|g[eé]nero)\s*:\s*(.+)$")
        .expect("failed to compile category regex")
});

/// Meridiem and hour suffixes accepted after a clock time, longest first.
const TIME_SUFFIXES: &[&str] = &[
    "a. m.", "p. m.", "a.m.", "p.m.", "hrs.", "a.m", "p.m", "hrs", "am", "pm", "hr", "h",
];

/// Day section a programme was listed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHeader {
    /// Weekday name as printed on the page (lower-cased).
    pub weekday_name: String,
    /// Parsed weekday, `None` if the name is not a known Spanish weekday.
    pub weekday: Option<Weekday>,
    /// Day of month printed next to the weekday.
    pub day_of_month: u32,
}

impl DayHeader {
    /// Parses a header line. Returns `None` if the line is not a header.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let caps = SECTION_RE.captures(line)?;
        let weekday_name = caps.get(1)?.as_str().to_lowercase();
        let day_of_month: u32 = caps.get(2)?.as_str().parse().ok()?;
        Some(Self {
            weekday: spanish_weekday(&weekday_name),
            weekday_name,
            day_of_month,
        })
    }
}

/// Maps a lower-case Spanish weekday name (with or without accents).
fn spanish_weekday(name: &str) -> Option<Weekday> {
    match name {
        "lunes" => Some(Weekday::Mon),
        "martes" => Some(Weekday::Tue),
        "miércoles" | "miercoles" => Some(Weekday::Wed),
        "jueves" => Some(Weekday::Thu),
        "viernes" => Some(Weekday::Fri),
        "sábado" | "sabado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Programme record as found on the page, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Title line.
    pub title_text: String,
    /// Clock time text including any meridiem suffix.
    pub raw_time_text: String,
    /// Free-text lines following the title.
    pub raw_description: Option<String>,
    /// `Categoría:` annotation, if present.
    pub raw_category: Option<String>,
    /// Section the entry was listed under.
    pub section: Option<DayHeader>,
}

impl RawEntry {
    /// Creates an entry with only the required fields.
    #[must_use]
    pub fn new(title: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            title_text: title.into(),
            raw_time_text: time.into(),
            raw_description: None,
            raw_category: None,
            section: None,
        }
    }
}

/// Classified text line.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Header(DayHeader),
    Time(String),
    TimedTitle(String, String),
    Text(String),
}

fn classify(line: String) -> Line {
    if let Some(header) = DayHeader::parse(&line) {
        return Line::Header(header);
    }
    match split_time_prefix(&line) {
        Some((time, rest)) if rest.is_empty() => Line::Time(time),
        Some((time, rest)) => Line::TimedTitle(time, String::from(rest)),
        None => Line::Text(line),
    }
}

/// Splits a leading clock time (with optional suffix) from the rest of the line.
fn split_time_prefix(line: &str) -> Option<(String, &str)> {
    let caps = TIME_PREFIX_RE.captures(line)?;
    let digits = caps.get(1)?.as_str();
    let rest = caps.get(2).map_or("", |m| m.as_str().trim_start());

    let lower = rest.to_lowercase();
    let suffix = TIME_SUFFIXES.iter().find(|s| {
        lower.starts_with(*s)
            && lower
                .get(s.len()..)
                .and_then(|after| after.chars().next())
                .is_none_or(|c| c.is_whitespace() || matches!(c, '-' | '|' | '–'))
    });

    let (time, rest) = match suffix {
        Some(s) => (
            format!("{digits} {}", rest.get(..s.len()).unwrap_or(s)),
            rest.get(s.len()..).unwrap_or(""),
        ),
        None => (String::from(digits), rest),
    };

    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | '–'));
    Some((time, rest))
}

/// Entry being assembled; trailing lines are only kept if another
/// time or header follows, so page footers never become descriptions.
#[derive(Debug)]
struct PendingEntry {
    entry: RawEntry,
    trailing: Vec<String>,
}

impl PendingEntry {
    fn finish(mut self, keep_trailing: bool) -> RawEntry {
        if keep_trailing {
            let mut description: Vec<String> = Vec::new();
            for line in self.trailing {
                match CATEGORY_RE.captures(&line).and_then(|c| c.get(1)) {
                    Some(cat) if self.entry.raw_category.is_none() => {
                        self.entry.raw_category = Some(String::from(cat.as_str().trim()));
                    }
                    _ => description.push(line),
                }
            }
            if !description.is_empty() {
                self.entry.raw_description = Some(description.join(" "));
            }
        }
        self.entry
    }
}

#[derive(Debug, Default)]
enum Pending {
    #[default]
    Idle,
    Time(String),
    Entry(PendingEntry),
}

/// Lazily turns text lines into [`RawEntry`] values in page order.
///
/// Lines before the first section header are ignored.
#[derive(Debug)]
pub struct RawEntries<I> {
    lines: I,
    section: Option<DayHeader>,
    pending: Pending,
    sections_seen: usize,
    lines_seen: usize,
}

impl<I: Iterator<Item = String>> RawEntries<I> {
    /// Wraps an iterator of already-normalised text lines.
    pub const fn new(lines: I) -> Self {
        Self {
            lines,
            section: None,
            pending: Pending::Idle,
            sections_seen: 0,
            lines_seen: 0,
        }
    }

    /// Number of section headers encountered so far.
    #[must_use]
    pub const fn sections_seen(&self) -> usize {
        self.sections_seen
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub const fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    /// Takes the pending entry, if any, committing trailing lines.
    fn flush(&mut self) -> Option<RawEntry> {
        match std::mem::take(&mut self.pending) {
            Pending::Entry(p) => Some(p.finish(true)),
            Pending::Idle | Pending::Time(_) => None,
        }
    }

    fn start_entry(&mut self, time: String, title: String) {
        let mut entry = RawEntry::new(title, time);
        entry.section.clone_from(&self.section);
        self.pending = Pending::Entry(PendingEntry {
            entry,
            trailing: Vec::new(),
        });
    }
}

impl<I: Iterator<Item = String>> Iterator for RawEntries<I> {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        loop {
            let Some(line) = self.lines.next() else {
                return match std::mem::take(&mut self.pending) {
                    Pending::Entry(p) => Some(p.finish(false)),
                    Pending::Idle | Pending::Time(_) => None,
                };
            };
            self.lines_seen = self.lines_seen.saturating_add(1);

            match classify(line) {
                Line::Header(header) => {
                    let done = self.flush();
                    self.section = Some(header);
                    self.sections_seen = self.sections_seen.saturating_add(1);
                    if done.is_some() {
                        return done;
                    }
                }
                _ if self.section.is_none() => {}
                Line::Time(time) => {
                    let done = self.flush();
                    self.pending = Pending::Time(time);
                    if done.is_some() {
                        return done;
                    }
                }
                Line::TimedTitle(time, title) => {
                    let done = self.flush();
                    self.start_entry(time, title);
                    if done.is_some() {
                        return done;
                    }
                }
                Line::Text(text) => {
                    if let Pending::Entry(p) = &mut self.pending {
                        p.trailing.push(text);
                    } else if let Pending::Time(time) = std::mem::take(&mut self.pending) {
                        self.start_entry(time, text);
                    }
                }
            }
        }
    }
}

/// Flattens an HTML document into trimmed, NFC-normalised, non-empty lines.
#[must_use]
pub fn text_lines(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| IGNORED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        for raw in text.split('\n') {
            let line = raw
                .nfc()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }

    lines
}

/// Extracts raw programme entries from a schedule page, in page order.
///
/// # Errors
///
/// Returns [`ExtractError::ScheduleNotFound`] if the page contains no
/// day section header at all.
pub fn extract(html: &str) -> Result<Vec<RawEntry>, ExtractError> {
    let mut entries = RawEntries::new(text_lines(html).into_iter());
    let collected: Vec<RawEntry> = entries.by_ref().collect();

    if entries.sections_seen() == 0 {
        return Err(ExtractError::ScheduleNotFound {
            lines: entries.lines_seen(),
        });
    }

    tracing::debug!(
        sections = entries.sections_seen(),
        lines = entries.lines_seen(),
        entries = collected.len(),
        "page scanned"
    );
    Ok(collected)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    fn lines(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter().map(|s| String::from(*s)).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_day_header_parse() {
        // Arrange & Act
        let header = DayHeader::parse("Programación de Jueves 1").unwrap();

        // Assert
        assert_eq!(header.weekday, Some(Weekday::Thu));
        assert_eq!(header.weekday_name, "jueves");
        assert_eq!(header.day_of_month, 1);
    }

    #[test]
    fn test_day_header_accents_and_case() {
        // Arrange & Act
        let with_accent = DayHeader::parse("PROGRAMACIÓN DE MIÉRCOLES 14").unwrap();
        let without_accent = DayHeader::parse("Programacion de sabado 3").unwrap();

        // Assert
        assert_eq!(with_accent.weekday, Some(Weekday::Wed));
        assert_eq!(with_accent.day_of_month, 14);
        assert_eq!(without_accent.weekday, Some(Weekday::Sat));
    }

    #[test]
    fn test_day_header_unknown_weekday() {
        // Arrange & Act
        let header = DayHeader::parse("Programación de Feriado 5").unwrap();

        // Assert
        assert_eq!(header.weekday, None);
        assert_eq!(header.weekday_name, "feriado");
    }

    #[test]
    fn test_day_header_rejects_plain_text() {
        // Arrange & Act & Assert
        assert!(DayHeader::parse("Programación").is_none());
        assert!(DayHeader::parse("Las Noticias").is_none());
    }

    #[test]
    fn test_split_time_prefix_variants() {
        // Arrange & Act & Assert
        assert_eq!(
            split_time_prefix("06:00"),
            Some((String::from("06:00"), ""))
        );
        assert_eq!(
            split_time_prefix("6.30 pm"),
            Some((String::from("6.30 pm"), ""))
        );
        assert_eq!(
            split_time_prefix("11:00 a.m. - Hoy en Multimedios"),
            Some((String::from("11:00 a.m."), "Hoy en Multimedios"))
        );
        assert_eq!(
            split_time_prefix("06:00 Las Noticias"),
            Some((String::from("06:00"), "Las Noticias"))
        );
        assert_eq!(
            split_time_prefix("07:00 Pmtv Noticias"),
            Some((String::from("07:00"), "Pmtv Noticias"))
        );
        assert_eq!(split_time_prefix("Las Noticias"), None);
        assert_eq!(split_time_prefix("123:00"), None);
    }

    #[test]
    fn test_entries_pair_time_and_title() {
        // Arrange
        let input = lines(&[
            "Programación de Jueves 1",
            "06:00",
            "Las Noticias",
            "09:00",
            "Hoy en Multimedios",
        ]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title_text, "Las Noticias");
        assert_eq!(entries[0].raw_time_text, "06:00");
        assert_eq!(entries[1].title_text, "Hoy en Multimedios");
        assert_eq!(entries[1].section.as_ref().unwrap().day_of_month, 1);
    }

    #[test]
    fn test_entries_ignore_preamble() {
        // Arrange
        let input = lines(&["Inicio", "10:00", "Noticias", "Programación de Lunes 5", "11:00", "Show"]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title_text, "Show");
    }

    #[test]
    fn test_entries_description_and_category() {
        // Arrange
        let input = lines(&[
            "Programación de Jueves 1",
            "09:00",
            "Hoy en Multimedios",
            "Revista matutina",
            "con invitados.",
            "Categoría: Entretenimiento",
            "12:00",
            "Acábatelo",
        ]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(
            entries[0].raw_description.as_deref(),
            Some("Revista matutina con invitados.")
        );
        assert_eq!(entries[0].raw_category.as_deref(), Some("Entretenimiento"));
        assert_eq!(entries[1].raw_description, None);
    }

    #[test]
    fn test_entries_discard_footer_after_last_entry() {
        // Arrange
        let input = lines(&[
            "Programación de Jueves 1",
            "23:00",
            "Cierre",
            "© 2024 Multimedios",
        ]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].raw_description, None);
    }

    #[test]
    fn test_entries_consecutive_times_keep_last() {
        // Arrange
        let input = lines(&["Programación de Jueves 1", "06:00", "06:30", "Noticias"]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].raw_time_text, "06:30");
    }

    #[test]
    fn test_entries_time_without_title_is_dropped() {
        // Arrange
        let input = lines(&[
            "Programación de Jueves 1",
            "22:00",
            "Programación de Viernes 2",
            "06:00",
            "Noticias",
        ]);

        // Act
        let entries: Vec<RawEntry> = RawEntries::new(input).collect();

        // Assert
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].section.as_ref().unwrap().weekday, Some(Weekday::Fri));
    }

    #[test]
    fn test_text_lines_skip_scripts_and_decode_entities() {
        // Arrange
        let html = r#"<html><head><script>var t = "10:00";</script><style>p{}</style></head>
            <body><p>  Las   Noticias &amp; Deportes </p><p>
            06:00
            </p></body></html>"#;

        // Act
        let result = text_lines(html);

        // Assert
        assert_eq!(result, vec!["Las Noticias & Deportes", "06:00"]);
    }

    #[test]
    fn test_text_lines_normalise_to_nfc() {
        // Arrange: "Programación" with a combining acute accent
        let html = "<p>Programacio\u{301}n de Jueves 1</p>";

        // Act
        let result = text_lines(html);

        // Assert
        assert_eq!(result, vec!["Programación de Jueves 1"]);
    }

    #[test]
    fn test_extract_fixture() {
        // Arrange
        let html = include_str!("../../../fixtures/multimedios/programacion.html");

        // Act
        let entries = extract(html).unwrap();

        // Assert
        assert_eq!(entries.len(), 11);
        assert_eq!(entries[0].title_text, "Las Noticias Primera Edición");
        assert_eq!(entries[1].raw_category.as_deref(), Some("Entretenimiento"));
        assert_eq!(entries[3].title_text, "Las Noticias & Deportes");
        assert_eq!(entries[7].raw_time_text, "06:00");
        assert_eq!(entries[10].title_text, "Cocina con Chef");
        assert_eq!(entries[10].raw_description, None);
    }

    #[test]
    fn test_extract_without_sections_fails() {
        // Arrange
        let html = "<html><body><p>Página en mantenimiento</p></body></html>";

        // Act
        let result = extract(html);

        // Assert
        assert_eq!(result, Err(ExtractError::ScheduleNotFound { lines: 1 }));
    }

    #[test]
    fn test_extract_sections_without_entries_is_ok() {
        // Arrange
        let html = "<h2>Programación de Jueves 1</h2><p>Sin programación disponible</p>";

        // Act
        let entries = extract(html).unwrap();

        // Assert
        assert!(entries.is_empty());
    }
}
