//! Macro kind inference.
//!
//! Classifies a declared literal by attempting ordered parses: integer,
//! decimal, datetime (against a fixed format list), then the database
//! suffix, falling back to plain string. Pure functions of the literal -
//! unparseable input never fails, it classifies as `string`.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::types::MacroKind;

/// Declared literals ending in this suffix denote database/schema names.
pub const DATABASE_SUFFIX: &str = "_MM2_CY2";

/// Candidate datetime formats, in priority order. When a literal parses
/// under more than one, the LAST match wins. That tie-break is load-bearing:
/// `12-10-18` parses as both `%Y-%m-%d` (year 12) and `%y-%m-%d` (year
/// 2012), and existing configurations rely on the two-digit-year reading.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%y-%m-%d",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Extra formats accepted by the lenient pre-filter only. A literal that
/// parses under one of these but under none of `DATETIME_FORMATS` still
/// classifies as `string`.
const LENIENT_EXTRA_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y",
    "%m/%d/%Y",
    "%d/%m/%y",
    "%d %b %Y",
    "%b %d %Y",
    "%B %d, %Y",
];

/// Classify a declared literal into its macro kind.
pub fn classify(literal: &str) -> MacroKind {
    if literal.parse::<i64>().is_ok() {
        return MacroKind::Integer;
    }
    if Decimal::from_str(literal).is_ok() {
        return MacroKind::Decimal;
    }
    if let Some(fmt) = infer_datetime_format(literal) {
        return MacroKind::Datetime(fmt);
    }
    if literal.ends_with(DATABASE_SUFFIX) {
        return MacroKind::Database;
    }
    MacroKind::String
}

/// True iff the literal both starts and ends with a single-quote character.
pub fn is_quoted(literal: &str) -> bool {
    literal.starts_with('\'') && literal.ends_with('\'')
}

/// Find the datetime format a literal parses under, if any.
///
/// A lenient pre-filter (the full format battery) gates the search; if it
/// rejects the literal, every canonical format is skipped. Among canonical
/// formats the last successful parse wins, not the first.
pub fn infer_datetime_format(literal: &str) -> Option<String> {
    if !lenient_parse(literal) {
        return None;
    }

    let mut found = None;
    for fmt in DATETIME_FORMATS {
        if parse_datetime(literal, fmt).is_some() {
            found = Some((*fmt).to_string());
        }
    }
    found
}

/// Parse a literal under one strftime-style format. Formats carrying a time
/// component (`%H`) parse as full datetimes; date-only formats parse as
/// dates at midnight.
pub fn parse_datetime(literal: &str, fmt: &str) -> Option<NaiveDateTime> {
    if fmt.contains("%H") {
        NaiveDateTime::parse_from_str(literal, fmt).ok()
    } else {
        NaiveDate::parse_from_str(literal, fmt)
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN))
    }
}

/// Render a datetime back out under the same format it was parsed with.
pub fn format_datetime(dt: &NaiveDateTime, fmt: &str) -> String {
    if fmt.contains("%H") {
        dt.format(fmt).to_string()
    } else {
        dt.date().format(fmt).to_string()
    }
}

fn lenient_parse(literal: &str) -> bool {
    DATETIME_FORMATS
        .iter()
        .chain(LENIENT_EXTRA_FORMATS.iter())
        .any(|fmt| parse_datetime(literal, fmt).is_some())
}
