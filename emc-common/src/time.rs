//! Date and timestamp utilities

use chrono::{DateTime, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date (UTC), used as the update date of new or changed rows
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse the date spellings catalogs use
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` and a leading date in an
/// ISO timestamp (`2023-04-01T12:00:00`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    ["%Y-%m-%d", "%Y/%m/%d", "%Y-%m"]
        .iter()
        .find_map(|fmt| {
            if *fmt == "%Y-%m" {
                NaiveDate::parse_from_str(&format!("{}-01", date_part), "%Y-%m-%d").ok()
            } else {
                NaiveDate::parse_from_str(date_part, fmt).ok()
            }
        })
}

/// Format a date the way output tables carry it
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
