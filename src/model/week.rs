use chrono::{DateTime, Datelike, Duration, Utc};

use super::constants::WEEK_DAYS;

/// Time coordinates of one weekly run, all derived from a single reference instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekWindow {
    pub as_of: DateTime<Utc>,
    /// Start of the trailing activity window
    pub since: DateTime<Utc>,
    /// Label of the week that just elapsed. Receives the pre-recompute close-out rows.
    pub closing_label: String,
    /// Label of the week being opened. Receives the post-recompute rows.
    pub opening_label: String,
    pub month_label: String,
    pub year_label: String
}

impl WeekWindow {
    pub fn new(as_of: DateTime<Utc>) -> WeekWindow {
        let since = as_of - Duration::days(WEEK_DAYS);

        WeekWindow {
            as_of,
            since,
            closing_label: week_label(since),
            opening_label: week_label(as_of),
            month_label: as_of.format("%Y-%m").to_string(),
            year_label: as_of.format("%Y").to_string()
        }
    }
}

/// ISO-8601 week label, e.g. `2026-W42`. Uses the ISO week-numbering year, so
/// the first days of January may belong to the previous year's last week.
pub fn week_label(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
