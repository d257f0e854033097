//! CSV row serialization (spec §6, "external interfaces").
//!
//! Explicitly out of scope as a *feature*: this crate does not read or
//! write CSV files. What spec §6 asks the core to expose is narrower — a
//! capability a CSV-writing collaborator can call to turn one row's
//! values into one correctly-quoted line, so that collaborator does not
//! have to duplicate per-`Value`-type formatting rules. Grounded on the
//! teacher's `statement::serialize` wire-format conventions (escape then
//! delimit) already reused by `pack.rs`.

use crate::value::Value;

/// Field/line/quoting configuration for [`serialize_row`]. Defaults match
/// spec §6: `;` field separator, CRLF line separator, `"` qualifier,
/// doubled-quote escape.
#[derive(Debug, Clone)]
pub struct CsvDialect {
    pub field_separator: char,
    pub line_separator: &'static str,
    pub qualifier: char,
    pub escape: &'static str,
}

impl Default for CsvDialect {
    fn default() -> Self {
        CsvDialect {
            field_separator: ';',
            line_separator: "\r\n",
            qualifier: '"',
            escape: "\"\"",
        }
    }
}

/// Serializes one value per spec §6: strings are quoted (with the
/// qualifier doubled inside), doubles render via Rust's default
/// (locale-independent, matching C-locale decimal formatting), ints as
/// plain decimal, bools as `1`/`0`, dates as UTC ISO 8601, and `Empty`/
/// `Invalid` as an empty field.
pub fn serialize_value(value: &Value, dialect: &CsvDialect) -> String {
    match value {
        Value::String(s) => quote(s, dialect),
        Value::Int(i) => i.to_string(),
        Value::Double(d) => crate::value::format_double(*d),
        Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
        Value::Date(secs) => quote(&crate::datetime::to_utc_iso8601(*secs), dialect),
        Value::Blob(_) | Value::Empty | Value::Invalid => String::new(),
    }
}

fn quote(s: &str, dialect: &CsvDialect) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(dialect.qualifier);
    for c in s.chars() {
        if c == dialect.qualifier {
            out.push_str(dialect.escape);
        } else {
            out.push(c);
        }
    }
    out.push(dialect.qualifier);
    out
}

/// Serializes an ordered sequence of values into one CSV line (without a
/// trailing line separator — the caller joins lines with
/// `dialect.line_separator`).
pub fn serialize_row(values: &[Value], dialect: &CsvDialect) -> String {
    values
        .iter()
        .map(|v| serialize_value(v, dialect))
        .collect::<Vec<_>>()
        .join(&dialect.field_separator.to_string())
}

/// Serializes a full row set (header + data rows) joined by
/// `dialect.line_separator`, with a trailing separator after the last
/// line (matching the common CSV convention of a terminating newline).
pub fn serialize_rows(header: &[String], rows: &[Vec<Value>], dialect: &CsvDialect) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.iter().map(|h| quote(h, dialect)).collect::<Vec<_>>().join(&dialect.field_separator.to_string()));
    for row in rows {
        lines.push(serialize_row(row, dialect));
    }
    let mut out = lines.join(dialect.line_separator);
    out.push_str(dialect.line_separator);
    out
}
