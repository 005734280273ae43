//! Temporal Index - calendar buckets over record positions
//!
//! Maps formatted date keys (day, month, year, ISO week, quarter, semester)
//! to the positions of records falling in that period. Bucket lists keep
//! insertion order, so iterating a bucket replays the original record order.
//!
//! # Bucket keys
//!
//! | Granularity | Key format | Example |
//! |---|---|---|
//! | day | `YYYY-MM-DD` | `2024-01-05` |
//! | month | `YYYY-MM` | `2024-01` |
//! | year | `YYYY` | `2024` |
//! | week | `YYYY-Www` (ISO week year) | `2024-W01` |
//! | quarter | `YYYY-Qn` | `2024-Q1` |
//! | semester | `YYYY-Sn` | `2024-S1` |
//!
//! Week keys use the ISO week-numbering year, so an early-January date can
//! legitimately land in the previous year's W52/W53 bucket.

use chrono::{Datelike, DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

/// Parse a raw record date string into a calendar date
///
/// Accepts `YYYY-MM-DD`, a naive ISO 8601 datetime, or a full RFC 3339
/// datetime with offset. Returns `None` for anything else; callers decide
/// whether that means "skip" (indexing) or "unclassified" (delivery).
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(datetime.date());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }
    None
}

/// The full set of bucket keys derived from one calendar date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKeys {
    pub day: String,
    pub month: String,
    pub year: String,
    pub week: String,
    pub quarter: String,
    pub semester: String,
}

impl BucketKeys {
    /// Derive every bucket key for a date
    pub fn for_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        let quarter = (date.month0() / 3) + 1;
        let semester = if date.month() <= 6 { 1 } else { 2 };

        Self {
            day: date.format("%Y-%m-%d").to_string(),
            month: date.format("%Y-%m").to_string(),
            year: date.format("%Y").to_string(),
            week: format!("{}-W{:02}", iso.year(), iso.week()),
            quarter: format!("{}-Q{}", date.year(), quarter),
            semester: format!("{}-S{}", date.year(), semester),
        }
    }
}

/// Calendar buckets over record positions
///
/// Positions index into the owning engine's record snapshot. The index is
/// append-only between `clear` calls; the engine rebuilds it wholesale.
#[derive(Debug, Default)]
pub struct TemporalIndex {
    by_date: HashMap<String, Vec<usize>>,
    by_month: HashMap<String, Vec<usize>>,
    by_year: HashMap<String, Vec<usize>>,
    by_week: HashMap<String, Vec<usize>>,
    by_quarter: HashMap<String, Vec<usize>>,
    by_semester: HashMap<String, Vec<usize>>,
}

impl TemporalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record position to every bucket its date falls in
    pub fn add(&mut self, position: usize, date: NaiveDate) {
        let keys = BucketKeys::for_date(date);
        self.by_date.entry(keys.day).or_default().push(position);
        self.by_month.entry(keys.month).or_default().push(position);
        self.by_year.entry(keys.year).or_default().push(position);
        self.by_week.entry(keys.week).or_default().push(position);
        self.by_quarter.entry(keys.quarter).or_default().push(position);
        self.by_semester.entry(keys.semester).or_default().push(position);
    }

    /// Positions for a day key (`YYYY-MM-DD`)
    pub fn on_day(&self, key: &str) -> &[usize] {
        self.by_date.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions for a month key (`YYYY-MM`)
    pub fn in_month(&self, key: &str) -> &[usize] {
        self.by_month.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions for a year key (`YYYY`)
    pub fn in_year(&self, key: &str) -> &[usize] {
        self.by_year.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions for an ISO week key (`YYYY-Www`)
    pub fn in_week(&self, key: &str) -> &[usize] {
        self.by_week.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions for a quarter key (`YYYY-Qn`)
    pub fn in_quarter(&self, key: &str) -> &[usize] {
        self.by_quarter.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Positions for a semester key (`YYYY-Sn`)
    pub fn in_semester(&self, key: &str) -> &[usize] {
        self.by_semester.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// All month keys currently holding records, sorted ascending
    pub fn month_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_month.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All day keys currently holding records, sorted ascending
    pub fn day_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_date.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of distinct day buckets
    pub fn day_bucket_count(&self) -> usize {
        self.by_date.len()
    }

    /// Discard all buckets
    pub fn clear(&mut self) {
        self.by_date.clear();
        self.by_month.clear();
        self.by_year.clear();
        self.by_week.clear();
        self.by_quarter.clear();
        self.by_semester.clear();
    }

    /// Rough memory footprint of the bucket maps in bytes
    pub fn approx_bytes(&self) -> usize {
        [
            &self.by_date,
            &self.by_month,
            &self.by_year,
            &self.by_week,
            &self.by_quarter,
            &self.by_semester,
        ]
        .iter()
        .map(|map| {
            map.iter()
                .map(|(key, bucket)| key.len() + bucket.len() * std::mem::size_of::<usize>())
                .sum::<usize>()
        })
        .sum()
    }
}
