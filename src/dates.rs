//! Forgiving date parsing shared by the scraped tables and the reference dataset.
//!
//! Both sides of the reconciliation are reduced to a calendar [`NaiveDate`]; time of
//! day and UTC offsets are dropped so independently parsed values compare equal.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};

/// Tried before `DATE_FORMATS`, which would read "39" as the year 39
const TWO_DIGIT_YEAR_FORMATS: &[&str] = &["%m/%d/%y", "%m-%d-%y"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Formats carrying only a month and year; the first of the month is used
const MONTH_FORMATS: &[&str] = &["%B %Y", "%b %Y", "%m/%Y", "%Y-%m"];

/// Parse a date written in any of the common archival styles.
///
/// Returns `None` instead of an error for anything unrecognised; callers keep the
/// row with a null date.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }

    // Offsets such as "+00:00" or a trailing "Z" are irrelevant to the calendar date
    if let Some(stripped) = strip_offset(text)
        && stripped != text
    {
        return parse_flexible_date(stripped);
    }

    for fmt in TWO_DIGIT_YEAR_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(pull_into_past(date));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }

    for fmt in MONTH_FORMATS {
        // chrono needs a day to build a date, so pin it to the 1st
        let padded = format!("{} 1", text);
        let padded_fmt = format!("{} %d", fmt);
        if let Ok(date) = NaiveDate::parse_from_str(&padded, &padded_fmt) {
            return Some(date);
        }
    }

    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = text.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }

    None
}

/// A two-digit year never lands in the future: "39" is 1939, not 2039
fn pull_into_past(date: NaiveDate) -> NaiveDate {
    if date.year() > Local::now().year() {
        date.with_year(date.year() - 100).unwrap_or(date)
    } else {
        date
    }
}

fn strip_offset(text: &str) -> Option<&str> {
    if let Some(rest) = text.strip_suffix('Z') {
        return Some(rest.trim_end());
    }
    // "+HH:MM" / "-HH:MM" after a time component
    if text.len() > 6 && text.contains(':') {
        let split = text.len() - 6;
        if !text.is_char_boundary(split) {
            return Some(text);
        }
        let tail = &text[split..];
        let tail_bytes = tail.as_bytes();
        if (tail_bytes[0] == b'+' || tail_bytes[0] == b'-')
            && tail_bytes[3] == b':'
            && tail[1..3].chars().all(|c| c.is_ascii_digit())
            && tail[4..].chars().all(|c| c.is_ascii_digit())
        {
            return Some(text[..split].trim_end());
        }
    }
    Some(text)
}

/// Serde adapter for optional dates in delimited files.
///
/// Writes ISO `YYYY-MM-DD` (empty for null) and reads anything
/// [`parse_flexible_date`] accepts, so files written by other tools reload too.
pub mod optional_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_flexible_date))
    }
}
