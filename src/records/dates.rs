use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::{CellValue, Record};

pub const DATE_COLUMN: &str = "date";
pub const YEAR_COLUMN: &str = "year";
pub const MONTH_COLUMN: &str = "month";

/// Add `date` (`24/01/31`), `year` (`CY24`) and `month` (`24'01`) columns computed from the
/// timestamp in `source`. Returns false and leaves the record alone if there's no parseable
/// timestamp.
pub fn derive_date_columns(record: &mut Record, source: &str) -> bool {
    let CellValue::String(timestamp) = record.value(source) else {
        log::debug!("No timestamp in column '{source}', not deriving dates");
        return false;
    };
    let Some(timestamp) = parse_timestamp(timestamp) else {
        log::debug!("Couldn't parse timestamp {timestamp:?}, not deriving dates");
        return false;
    };
    record.insert(DATE_COLUMN, timestamp.format("%y/%m/%d").to_string());
    record.insert(YEAR_COLUMN, timestamp.format("CY%y").to_string());
    record.insert(MONTH_COLUMN, timestamp.format("%y'%m").to_string());
    true
}

/// ISO-8601 with or without offset, or a plain date. Timestamps with an offset keep their
/// local wall-clock date.
fn parse_timestamp(timestamp: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(timestamp, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
