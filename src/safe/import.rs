//! Parse XML and tab-delimited text data files back into records.
//!
//! Both parsers accept what `export` writes.  Uuids in the data file are
//! ignored: the store assigns fresh ones when it merges.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::export::{XML_ENTRY, XML_ROOT};
use super::record::{FieldMask, Record, RecordField};
use crate::backend::DataFormat;
use crate::errors::{Result, SafeCliError};

/// Read and parse the data file at `source`.
pub fn read_import(source: &Path, format: DataFormat, delimiter: char) -> Result<Vec<Record>> {
    let content = fs::read_to_string(source)?;
    match format {
        DataFormat::Text => parse_text(&content, delimiter),
        DataFormat::Xml => parse_xml(&content),
    }
}

/// Parse a text export: a header row naming the columns, then one
/// tab-separated row per record.  Blank lines are ignored.
pub fn parse_text(content: &str, delimiter: char) -> Result<Vec<Record>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(SafeCliError::InvalidImport("missing header row".into()));
    };

    let columns = header
        .split('\t')
        .map(|name| {
            RecordField::from_column_name(name.trim())
                .ok_or_else(|| SafeCliError::InvalidImport(format!("unknown column '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mask = columns.iter().copied().fold(FieldMask::none(), FieldMask::with);
    if !mask.contains(RecordField::Title) || !mask.contains(RecordField::Password) {
        return Err(SafeCliError::InvalidImport(
            "header must name Title and Password columns".into(),
        ));
    }

    let mut records = Vec::new();
    for (index, line) in lines {
        let line_no = index + 1;
        let values: Vec<&str> = line.split('\t').collect();
        if values.len() != columns.len() {
            return Err(SafeCliError::InvalidImport(format!(
                "line {line_no}: expected {} fields, found {}",
                columns.len(),
                values.len()
            )));
        }

        let mut record = Record::new("", "");
        for (field, raw) in columns.iter().zip(values) {
            let value = unescape_text(raw, delimiter);
            set_field(&mut record, *field, value)
                .map_err(|reason| SafeCliError::InvalidImport(format!("line {line_no}: {reason}")))?;
        }
        if record.title.is_empty() {
            return Err(SafeCliError::InvalidImport(format!("line {line_no}: empty title")));
        }
        records.push(record);
    }
    Ok(records)
}

/// Undo `export::escape_text`.  Unknown escapes keep the escaped character.
pub fn unescape_text(value: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            c if c == delimiter => out.push('\n'),
            c => out.push(c),
        }
    }
    out
}

/// Where the XML parser is in the document.
enum XmlState {
    Prolog,
    InRoot,
    InEntry { record: Record, seen: FieldMask },
    InField { record: Record, seen: FieldMask, field: RecordField, text: String },
    Done,
}

/// Parse an XML export.
///
/// A document that is not well-formed is `XmlMalformed`; a well-formed one
/// with the wrong structure is `XmlInvalid`.
pub fn parse_xml(content: &str) -> Result<Vec<Record>> {
    let mut reader = Reader::from_str(content);
    let mut records = Vec::new();
    let mut state = XmlState::Prolog;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SafeCliError::XmlMalformed(format!("at byte {}: {e}", reader.buffer_position())))?;

        state = match (state, event) {
            (state, Event::Eof) => {
                return match state {
                    XmlState::Done => Ok(records),
                    XmlState::Prolog => Err(SafeCliError::XmlInvalid(format!(
                        "no <{XML_ROOT}> element"
                    ))),
                    _ => Err(SafeCliError::XmlMalformed("unexpected end of document".into())),
                };
            }

            (XmlState::Prolog, Event::Start(e)) => {
                expect_name(&e, XML_ROOT)?;
                XmlState::InRoot
            }
            (XmlState::Prolog, Event::Empty(e)) => {
                expect_name(&e, XML_ROOT)?;
                XmlState::Done
            }

            (XmlState::InRoot, Event::Start(e)) => {
                expect_name(&e, XML_ENTRY)?;
                XmlState::InEntry {
                    record: Record::new("", ""),
                    seen: FieldMask::none(),
                }
            }
            (XmlState::InRoot, Event::Empty(e)) => {
                expect_name(&e, XML_ENTRY)?;
                return Err(SafeCliError::XmlInvalid(format!(
                    "entry {} has no title or password",
                    records.len() + 1
                )));
            }
            (XmlState::InRoot, Event::End(_)) => XmlState::Done,

            (XmlState::InEntry { record, seen }, Event::Start(e)) => XmlState::InField {
                field: field_of(&e)?,
                record,
                seen,
                text: String::new(),
            },
            (XmlState::InEntry { record, seen }, Event::Empty(e)) => {
                let field = field_of(&e)?;
                XmlState::InEntry {
                    record,
                    seen: seen.with(field),
                }
            }
            (XmlState::InEntry { record, seen }, Event::End(_)) => {
                if !seen.contains(RecordField::Title)
                    || !seen.contains(RecordField::Password)
                    || record.title.is_empty()
                {
                    return Err(SafeCliError::XmlInvalid(format!(
                        "entry {} has no title or password",
                        records.len() + 1
                    )));
                }
                records.push(record);
                XmlState::InRoot
            }

            (XmlState::InField { record, seen, field, mut text }, Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| SafeCliError::XmlMalformed(e.to_string()))?;
                text.push_str(&unescaped);
                XmlState::InField { record, seen, field, text }
            }
            (XmlState::InField { record, seen, field, mut text }, Event::CData(c)) => {
                let raw = c.into_inner();
                let chunk = std::str::from_utf8(&raw)
                    .map_err(|e| SafeCliError::XmlMalformed(e.to_string()))?;
                text.push_str(chunk);
                XmlState::InField { record, seen, field, text }
            }
            (XmlState::InField { mut record, seen, field, text }, Event::End(_)) => {
                set_field(&mut record, field, text).map_err(SafeCliError::XmlInvalid)?;
                XmlState::InEntry {
                    record,
                    seen: seen.with(field),
                }
            }
            (XmlState::InField { field, .. }, Event::Start(e) | Event::Empty(e)) => {
                return Err(SafeCliError::XmlInvalid(format!(
                    "unexpected <{}> inside <{}>",
                    String::from_utf8_lossy(e.name().as_ref()),
                    field.xml_tag()
                )));
            }

            (XmlState::Done, Event::Start(e) | Event::Empty(e)) => {
                return Err(SafeCliError::XmlMalformed(format!(
                    "<{}> after the root element",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }

            // Declarations, comments, processing instructions and the
            // whitespace between elements.
            (state, _) => state,
        };
    }
}

fn expect_name(element: &BytesStart<'_>, expected: &str) -> Result<()> {
    let name = element.name();
    if name.as_ref() == expected.as_bytes() {
        Ok(())
    } else {
        Err(SafeCliError::XmlInvalid(format!(
            "expected <{expected}>, found <{}>",
            String::from_utf8_lossy(name.as_ref())
        )))
    }
}

fn field_of(element: &BytesStart<'_>) -> Result<RecordField> {
    let name = element.name();
    let tag = String::from_utf8_lossy(name.as_ref());
    RecordField::from_xml_tag(&tag)
        .ok_or_else(|| SafeCliError::XmlInvalid(format!("unknown element <{tag}>")))
}

fn set_field(record: &mut Record, field: RecordField, value: String) -> std::result::Result<(), String> {
    match field {
        RecordField::Group => record.group = value,
        RecordField::Title => record.title = value,
        RecordField::Username => record.username = value,
        RecordField::Password => record.password = value,
        RecordField::Url => record.url = value,
        RecordField::Notes => record.notes = value,
        RecordField::CreatedAt => {
            if let Some(at) = parse_time(&value)? {
                record.created_at = at;
            }
        }
        RecordField::ModifiedAt => {
            if let Some(at) = parse_time(&value)? {
                record.modified_at = at;
            }
        }
        RecordField::Uuid => {}
    }
    Ok(())
}

fn parse_time(value: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|e| format!("bad timestamp '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe::export::{select, to_text, to_xml, ExportOptions};
    use crate::status::Status;

    fn sample() -> Vec<Record> {
        vec![
            Record::new("mail", "p\tw\\d")
                .with_group("home")
                .with_username("me")
                .with_url("https://mail.example")
                .with_notes("first\nsecond"),
            Record::new("bank", "<&secret>").with_group("money"),
        ]
    }

    #[test]
    fn text_export_parses_back() {
        let records = sample();
        let chosen = select(&records, &ExportOptions::default());
        let text = to_text(&chosen, FieldMask::all(), '\u{bb}');

        let parsed = parse_text(&text, '\u{bb}').unwrap();
        assert_eq!(parsed.len(), 2);
        let mail = parsed.iter().find(|r| r.title == "mail").unwrap();
        assert_eq!(mail.password, "p\tw\\d");
        assert_eq!(mail.notes, "first\nsecond");
        assert_eq!(mail.url, "https://mail.example");
        let original = &records[0];
        assert_eq!(mail.created_at.timestamp(), original.created_at.timestamp());
    }

    #[test]
    fn xml_export_parses_back() {
        let records = sample();
        let chosen = select(&records, &ExportOptions::default());
        let xml = to_xml(&chosen, FieldMask::all());

        let parsed = parse_xml(&xml).unwrap();
        assert_eq!(parsed.len(), 2);
        let bank = parsed.iter().find(|r| r.title == "bank").unwrap();
        assert_eq!(bank.password, "<&secret>");
        assert_eq!(bank.group, "money");
        let mail = parsed.iter().find(|r| r.title == "mail").unwrap();
        assert_eq!(mail.notes, "first\nsecond");
        assert_ne!(mail.uuid, records[0].uuid);
    }

    #[test]
    fn text_without_password_column_is_invalid() {
        let err = parse_text("Title\tUsername\nmail\tme\n", '|').unwrap_err();
        assert_eq!(err.status(), Status::InvalidFormat);
    }

    #[test]
    fn text_with_short_row_is_invalid() {
        let err = parse_text("Title\tPassword\nmail\n", '|').unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert_eq!(err.status(), Status::InvalidFormat);
    }

    #[test]
    fn empty_text_is_invalid() {
        assert!(parse_text("", '|').is_err());
        assert!(parse_text("\n\n", '|').is_err());
    }

    #[test]
    fn unescape_reverses_delimiter_substitution() {
        assert_eq!(unescape_text("a|b", '|'), "a\nb");
        assert_eq!(unescape_text("a\\|b", '|'), "a|b");
        assert_eq!(unescape_text("x\\ty\\\\", '|'), "x\ty\\");
    }

    #[test]
    fn malformed_xml_is_an_import_failure() {
        let err = parse_xml("<passwordsafe><entry><title>x</entry></passwordsafe>").unwrap_err();
        assert_eq!(err.status(), Status::XmlFailedImport);

        let err = parse_xml("<passwordsafe><entry>").unwrap_err();
        assert_eq!(err.status(), Status::XmlFailedImport);
    }

    #[test]
    fn wrong_root_fails_validation() {
        let err = parse_xml("<vault><entry/></vault>").unwrap_err();
        assert_eq!(err.status(), Status::XmlFailedValidation);
    }

    #[test]
    fn entry_without_password_fails_validation() {
        let xml = "<passwordsafe><entry><title>mail</title></entry></passwordsafe>";
        let err = parse_xml(xml).unwrap_err();
        assert_eq!(err.status(), Status::XmlFailedValidation);
    }

    #[test]
    fn empty_password_element_is_accepted() {
        let xml = "<passwordsafe><entry><title>mail</title><password/></entry></passwordsafe>";
        let parsed = parse_xml(xml).unwrap();
        assert_eq!(parsed[0].password, "");
    }

    #[test]
    fn empty_root_has_no_records() {
        assert!(parse_xml("<?xml version=\"1.0\"?><passwordsafe/>").unwrap().is_empty());
    }

    #[test]
    fn missing_source_cannot_be_opened() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = read_import(&dir.path().join("nope.xml"), DataFormat::Xml, '|').unwrap_err();
        assert_eq!(err.status(), Status::CantOpenFile);
    }
}
