use chrono::{DateTime, Local, NaiveDate, Utc};

const NOT_SPECIFIED: &str = "Not specified";

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// `YYYY-MM-DD` for date inputs; empty when missing or unparsable.
pub fn format_date_for_input(raw: Option<&str>) -> String {
    raw.and_then(parse_date)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Long form such as `March 4, 1994`.
pub fn format_date_for_display(raw: Option<&str>) -> String {
    raw.and_then(parse_date)
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

/// Two-digit `HH:MM` label in the viewer's local time zone.
pub fn format_time_label(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}
