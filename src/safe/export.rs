//! Plaintext exports: XML and tab-delimited text.
//!
//! Both writers take a `FieldMask` choosing the columns and an optional
//! subgroup filter choosing the records.  Records are written sorted by
//! group, title and username so exports are stable.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use quick_xml::escape::escape;

use super::record::{FieldMask, Record, RecordField};
use crate::backend::DataFormat;
use crate::errors::Result;

/// Default stand-in for line breaks inside text-export values.
pub const DEFAULT_DELIMITER: char = '\u{bb}';

/// Root element of XML exports.
pub const XML_ROOT: &str = "passwordsafe";

/// Element wrapping one record in XML exports.
pub const XML_ENTRY: &str = "entry";

/// How a subgroup filter compares a field with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Equals,
    Contains,
    BeginsWith,
    EndsWith,
}

/// Restricts an export to records whose `field` matches `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupFilter {
    pub field: RecordField,
    pub rule: MatchRule,
    pub value: String,
    pub case_sensitive: bool,
}

impl SubgroupFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let field = record.field(self.field);
        let (haystack, needle) = if self.case_sensitive {
            (field.into_owned(), self.value.clone())
        } else {
            (field.to_lowercase(), self.value.to_lowercase())
        };
        match self.rule {
            MatchRule::Equals => haystack == needle,
            MatchRule::Contains => haystack.contains(&needle),
            MatchRule::BeginsWith => haystack.starts_with(&needle),
            MatchRule::EndsWith => haystack.ends_with(&needle),
        }
    }
}

/// Record selection and text layout for an export.
///
/// The default selects every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub subgroup: Option<SubgroupFilter>,
    /// Replaces line breaks in text exports.
    pub delimiter: char,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            subgroup: None,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

/// Records chosen by `options`, in export order.
pub fn select<'r>(records: &'r [Record], options: &ExportOptions) -> Vec<&'r Record> {
    let mut chosen: Vec<&Record> = records
        .iter()
        .filter(|r| options.subgroup.as_ref().map_or(true, |f| f.matches(r)))
        .collect();
    chosen.sort_by(|a, b| a.merge_key().cmp(&b.merge_key()));
    chosen
}

/// Render records as an XML document.
pub fn to_xml(records: &[&Record], fields: FieldMask) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<{XML_ROOT} records=\"{}\">", records.len());
    for record in records {
        let _ = writeln!(out, "  <{XML_ENTRY}>");
        for field in fields.fields() {
            let tag = field.xml_tag();
            let _ = writeln!(out, "    <{tag}>{}</{tag}>", escape(record.field(field).as_ref()));
        }
        let _ = writeln!(out, "  </{XML_ENTRY}>");
    }
    let _ = writeln!(out, "</{XML_ROOT}>");
    out
}

/// Render records as tab-delimited text with a header row.
pub fn to_text(records: &[&Record], fields: FieldMask, delimiter: char) -> String {
    let mut out = String::new();
    let header: Vec<&str> = fields.fields().map(RecordField::column_name).collect();
    out.push_str(&header.join("\t"));
    out.push('\n');

    for record in records {
        let row: Vec<String> = fields
            .fields()
            .map(|f| escape_text(&record.field(f), delimiter))
            .collect();
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Escape one text-export value.
///
/// Backslash, tab and CR become `\\`, `\t`, `\r`; a literal delimiter is
/// `\` + delimiter; a line feed becomes the bare delimiter.
pub fn escape_text(value: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push(delimiter),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Whether `delimiter` can stand in for line breaks without clashing
/// with the tab separator or an escape sequence.
pub fn is_usable_delimiter(delimiter: char) -> bool {
    !matches!(delimiter, '\t' | '\n' | '\r' | '\\' | 't' | 'r')
}

/// Write selected records to `target`.  Returns how many were written.
pub fn write_export(
    records: &[Record],
    target: &Path,
    format: DataFormat,
    fields: FieldMask,
    options: &ExportOptions,
) -> Result<usize> {
    let chosen = select(records, options);
    let content = match format {
        DataFormat::Xml => to_xml(&chosen, fields),
        DataFormat::Text => to_text(&chosen, fields, options.delimiter),
    };

    fs::write(target, content)?;

    // Exports hold plaintext passwords.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(0o600))?;
    }

    Ok(chosen.len())
}
