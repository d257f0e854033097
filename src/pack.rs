//! # Pack encoding
//!
//! A "pack" is a single string encoding a sequence of values, accessed by
//! index (`nth`/`items`) or by alternating key/value (`value_for_key`).
//! The escape discipline is deliberately simple and is not otherwise
//! prescribed; this uses a
//! unit-separator field delimiter (`\x1f`) with a two-character escape
//! sequence, grounded on the teacher's `statement::serialize` wire-format
//! conventions (escape-then-delimit, rather than length-prefixing).

const FIELD_SEPARATOR: char = '\u{1f}';

fn encode_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            FIELD_SEPARATOR => out.push_str("\\s"),
            other => out.push(other),
        }
    }
    out
}

fn decode_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('s') => out.push(FIELD_SEPARATOR),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Packs display-string-rendered fields into one pack string.
pub fn pack(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| encode_field(f))
        .collect::<Vec<_>>()
        .join(&FIELD_SEPARATOR.to_string())
}

/// Unpacks a pack string into its fields, in order.
pub fn unpack(packed: &str) -> Vec<String> {
    if packed.is_empty() {
        return Vec::new();
    }
    packed.split(FIELD_SEPARATOR).map(decode_field).collect()
}

/// 1-indexed element lookup; `None` if out of range.
pub fn nth(packed: &str, index: i64) -> Option<String> {
    if index < 1 {
        return None;
    }
    unpack(packed).into_iter().nth((index - 1) as usize)
}

pub fn items(packed: &str) -> usize {
    if packed.is_empty() {
        0
    } else {
        unpack(packed).len()
    }
}

/// Interprets `packed` as alternating `key, value, key, value, ...` and
/// returns the value for the first matching key.
pub fn value_for_key(packed: &str, key: &str) -> Option<String> {
    let fields = unpack(packed);
    let mut it = fields.chunks_exact(2);
    for pair in &mut it {
        if pair[0] == key {
            return Some(pair[1].clone());
        }
    }
    None
}
