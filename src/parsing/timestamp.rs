//! The two timestamp formats used in ACE files.
//!
//! - `DS` lines: `Thu Sep 23 10:48:44 2004` (`EEE MMM d HH:mm:ss yyyy`)
//! - tag blocks: `040923:104844` (`yyMMdd:HHmmss`)

use chrono::NaiveDateTime;

const DS_PARSE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";
const DS_WRITE_FORMAT: &str = "%a %b %-d %H:%M:%S %Y";
const TAG_FORMAT: &str = "%y%m%d:%H%M%S";

/// Parse a `DS ... TIME:` value. Day numbers may be space padded.
#[must_use]
pub fn parse_trace_time(value: &str) -> Option<NaiveDateTime> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, DS_PARSE_FORMAT).ok()
}

#[must_use]
pub fn format_trace_time(time: &NaiveDateTime) -> String {
    time.format(DS_WRITE_FORMAT).to_string()
}

/// Parse a tag block timestamp
#[must_use]
pub fn parse_tag_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TAG_FORMAT).ok()
}

#[must_use]
pub fn format_tag_time(time: &NaiveDateTime) -> String {
    time.format(TAG_FORMAT).to_string()
}
