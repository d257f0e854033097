//! Date/time conversions backing the `Value::Date` variant and the
//! date/time function band.
//!
//! `Value::Date` stores seconds since an "agreed epoch" distinct from the
//! Unix epoch (2001-01-01T00:00:00Z, the convention this engine's QBE-style
//! ancestry uses — see DESIGN.md Open Question resolution). All component
//! extraction happens in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

/// Seconds between the agreed reference epoch (2001-01-01T00:00:00Z) and
/// the Unix epoch (1970-01-01T00:00:00Z).
pub const EPOCH_OFFSET_SECONDS: f64 = 978_307_200.0;

/// `to_unix(d) = d + epoch_offset`.
pub fn to_unix(internal_seconds: f64) -> f64 {
    internal_seconds + EPOCH_OFFSET_SECONDS
}

/// `from_unix(u) = u - epoch_offset`.
pub fn from_unix(unix_seconds: f64) -> f64 {
    unix_seconds - EPOCH_OFFSET_SECONDS
}

pub fn now() -> f64 {
    from_unix(Utc::now().timestamp_millis() as f64 / 1000.0)
}

fn to_datetime(internal_seconds: f64) -> Option<DateTime<Utc>> {
    let unix = to_unix(internal_seconds);
    let secs = unix.floor() as i64;
    let nanos = ((unix - secs as f64) * 1_000_000_000.0).round() as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

fn from_datetime(dt: DateTime<Utc>) -> f64 {
    from_unix(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1_000_000_000.0)
}

/// ISO-8601 output with millisecond precision and a `Z` timezone
/// designator.
pub fn to_utc_iso8601(internal_seconds: f64) -> String {
    match to_datetime(internal_seconds) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => String::new(),
    }
}

/// ISO-8601 output in the local timezone with a `±HH:MM` designator
///. The engine's notion of "local" is the process timezone via
/// `chrono::Local`.
pub fn to_local_iso8601(internal_seconds: f64) -> String {
    match to_datetime(internal_seconds) {
        Some(dt) => {
            let local = dt.with_timezone(&chrono::Local);
            local.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
        }
        None => String::new(),
    }
}

/// Accepts extended-format ISO-8601 (with or without a timezone
/// designator; naive timestamps are assumed UTC).
pub fn from_iso8601(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(from_datetime(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(from_datetime(Utc.from_utc_datetime(&naive)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(from_datetime(Utc.from_utc_datetime(&naive)));
    }
    None
}

/// Days since 1899-12-30 (Excel/Lotus epoch), UTC, fractional part is
/// fraction of a day.
pub fn to_excel_date(internal_seconds: f64) -> Option<f64> {
    let dt = to_datetime(internal_seconds)?;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let delta = dt.naive_utc().signed_duration_since(epoch);
    Some(delta.num_milliseconds() as f64 / 86_400_000.0)
}

pub fn from_excel_date(days: f64) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (days * 86_400_000.0).round() as i64;
    let naive = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    Some(from_datetime(Utc.from_utc_datetime(&naive)))
}

pub fn utc_year(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.year() as i64)
}
pub fn utc_month(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.month() as i64)
}
pub fn utc_day(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.day() as i64)
}
pub fn utc_hour(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.hour() as i64)
}
pub fn utc_minute(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.minute() as i64)
}
pub fn utc_second(internal_seconds: f64) -> Option<i64> {
    to_datetime(internal_seconds).map(|d| d.second() as i64)
}
/// Midnight UTC of the same calendar day.
pub fn utc_date(internal_seconds: f64) -> Option<f64> {
    let dt = to_datetime(internal_seconds)?;
    let midnight = dt.date_naive().and_hms_opt(0, 0, 0)?;
    Some(from_datetime(Utc.from_utc_datetime(&midnight)))
}

/// Translates a small subset of Unicode (UTS#35) date pattern letters
/// into `chrono::format::strftime` directives: `yyyy`/`yy`, `MM`/`M`,
/// `dd`/`d`, `HH`/`H`, `mm`/`m`, `ss`/`s`, and literal text passed through
/// unchanged. Sufficient for the common patterns this engine's formula
/// layer is expected to see; not a full UTS#35 implementation (see
/// DESIGN.md).
fn unicode_pattern_to_strftime(pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run_len = 1;
        while i + run_len < chars.len() && chars[i + run_len] == c {
            run_len += 1;
        }
        let token: String = match c {
            'y' => {
                if run_len >= 4 {
                    "%Y".to_string()
                } else {
                    "%y".to_string()
                }
            }
            'M' => {
                if run_len >= 2 {
                    "%m".to_string()
                } else {
                    "%-m".to_string()
                }
            }
            'd' => {
                if run_len >= 2 {
                    "%d".to_string()
                } else {
                    "%-d".to_string()
                }
            }
            'H' => {
                if run_len >= 2 {
                    "%H".to_string()
                } else {
                    "%-H".to_string()
                }
            }
            'm' => {
                if run_len >= 2 {
                    "%M".to_string()
                } else {
                    "%-M".to_string()
                }
            }
            's' => {
                if run_len >= 2 {
                    "%S".to_string()
                } else {
                    "%-S".to_string()
                }
            }
            other => other.to_string().repeat(run_len),
        };
        out.push_str(&token);
        i += run_len;
    }
    out
}

/// Parses `s` per a Unicode-style `format`, treating the result as UTC
///.
pub fn from_unicode_date(s: &str, format: &str) -> Option<f64> {
    let strftime_fmt = unicode_pattern_to_strftime(format);
    let naive = NaiveDateTime::parse_from_str(s, &strftime_fmt)
        .or_else(|_| {
            NaiveDate::parse_from_str(s, &strftime_fmt).map(|d| d.and_hms_opt(0, 0, 0).unwrap())
        })
        .ok()?;
    Some(from_datetime(Utc.from_utc_datetime(&naive)))
}

pub fn to_unicode_date(internal_seconds: f64, format: &str) -> Option<String> {
    let dt = to_datetime(internal_seconds)?;
    let strftime_fmt = unicode_pattern_to_strftime(format);
    Some(dt.format(&strftime_fmt).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_round_trip() {
        let internal = 12345.0;
        assert!((from_unix(to_unix(internal)) - internal).abs() < 1e-9);
    }

    #[test]
    fn excel_epoch_round_trip() {
        let internal = now();
        let days = to_excel_date(internal).unwrap();
        let back = from_excel_date(days).unwrap();
        assert!((back - internal).abs() < 1e-3);
    }

    #[test]
    fn iso8601_round_trip_utc() {
        let internal = 0.0;
        let s = to_utc_iso8601(internal);
        assert!(s.ends_with('Z'));
        let back = from_iso8601(&s).unwrap();
        assert!((back - internal).abs() < 1e-3);
    }

    #[test]
    fn unicode_pattern_extracts_date() {
        let internal = from_iso8601("2024-03-05T00:00:00Z").unwrap();
        let s = to_unicode_date(internal, "yyyy-MM-dd").unwrap();
        assert_eq!(s, "2024-03-05");
        let back = from_unicode_date(&s, "yyyy-MM-dd").unwrap();
        assert!((back - internal).abs() < 1.0);
    }

    #[test]
    fn component_extraction_is_utc() {
        let internal = from_iso8601("2024-03-05T13:45:30Z").unwrap();
        assert_eq!(utc_year(internal), Some(2024));
        assert_eq!(utc_month(internal), Some(3));
        assert_eq!(utc_day(internal), Some(5));
        assert_eq!(utc_hour(internal), Some(13));
        assert_eq!(utc_minute(internal), Some(45));
        assert_eq!(utc_second(internal), Some(30));
    }
}
