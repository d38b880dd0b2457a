//! XMLTV rendering.
//!
//! Produces a document of the form:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <!DOCTYPE tv SYSTEM "xmltv.dtd">
//! <tv generator-info-name="epgscrape">
//!   <channel id="...">
//!     <display-name lang="es">...</display-name>
//!   </channel>
//!   <programme start="20240801060000 -0600" stop="..." channel="...">
//!     <title lang="es">...</title>
//!     <desc lang="es">...</desc>
//!     <category lang="es">...</category>
//!   </programme>
//! </tv>
//! ```

use std::borrow::Cow;

use chrono::DateTime;
use chrono_tz::Tz;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::SerializeError;
use crate::guide::{GuideDocument, ResolvedEntry};

/// Value of the root `generator-info-name` attribute.
pub const GENERATOR_NAME: &str = "epgscrape";

/// Formats an instant as an XMLTV timestamp (`YYYYMMDDHHMMSS +HHMM`).
#[must_use]
pub fn xmltv_timestamp(dt: &DateTime<Tz>) -> String {
    dt.format("%Y%m%d%H%M%S %z").to_string()
}

type XmlWriter = Writer<Vec<u8>>;

/// Whether `c` may appear in an XML 1.0 document.
const fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..
    )
}

/// Drops characters XML 1.0 forbids (C0 controls, U+FFFE, U+FFFF).
///
/// Escaping cannot represent them, so they are removed before any text or
/// attribute value reaches the writer.
#[must_use]
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), SerializeError> {
    writer.write_event(event).map_err(|e| SerializeError {
        message: e.to_string(),
    })
}

fn text_element(
    writer: &mut XmlWriter,
    name: &str,
    lang: &str,
    text: &str,
) -> Result<(), SerializeError> {
    emit(
        writer,
        Event::Start(BytesStart::new(name).with_attributes([("lang", xml_safe(lang).as_ref())])),
    )?;
    emit(writer, Event::Text(BytesText::new(&xml_safe(text))))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn programme(
    writer: &mut XmlWriter,
    channel_id: &str,
    lang: &str,
    entry: &ResolvedEntry,
) -> Result<(), SerializeError> {
    let start = xmltv_timestamp(&entry.start);
    let stop = xmltv_timestamp(&entry.stop);
    let channel_id = xml_safe(channel_id);
    emit(
        writer,
        Event::Start(BytesStart::new("programme").with_attributes([
            ("start", start.as_str()),
            ("stop", stop.as_str()),
            ("channel", channel_id.as_ref()),
        ])),
    )?;
    text_element(writer, "title", lang, &entry.title)?;
    if let Some(desc) = entry.description.as_deref() {
        text_element(writer, "desc", lang, desc)?;
    }
    if let Some(category) = entry.category.as_deref() {
        text_element(writer, "category", lang, category)?;
    }
    emit(writer, Event::End(BytesEnd::new("programme")))
}

/// Renders a guide as an XMLTV document.
///
/// The output depends only on the document, so identical input yields
/// byte-identical output.
///
/// # Errors
///
/// Returns an error if the XML writer fails.
pub fn render_xmltv(doc: &GuideDocument) -> Result<Vec<u8>, SerializeError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    emit(
        &mut writer,
        Event::DocType(BytesText::from_escaped(r#"tv SYSTEM "xmltv.dtd""#)),
    )?;
    emit(
        &mut writer,
        Event::Start(
            BytesStart::new("tv").with_attributes([("generator-info-name", GENERATOR_NAME)]),
        ),
    )?;

    emit(
        &mut writer,
        Event::Start(
            BytesStart::new("channel").with_attributes([("id", xml_safe(&doc.channel.id).as_ref())]),
        ),
    )?;
    text_element(
        &mut writer,
        "display-name",
        &doc.lang,
        &doc.channel.display_name,
    )?;
    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;

    for entry in doc.timeline.entries() {
        programme(&mut writer, &doc.channel.id, &doc.lang, entry)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("tv")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}
