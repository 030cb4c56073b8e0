//! Calendar index: meetings grouped by local date.
//!
//! Keys are the `YYYY-MM-DD` date of `scheduled_at` in the viewer's
//! timezone, which is always passed in explicitly.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};

use crate::models::Meeting;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Format a date the way calendar keys are written.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Meetings on a single date, ordered by start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayEntry {
    pub meetings: Vec<Meeting>,
}

impl DayEntry {
    pub fn count(&self) -> usize {
        self.meetings.len()
    }

    fn insert_sorted(&mut self, meeting: Meeting) {
        let pos = self.meetings.partition_point(|m| {
            (m.scheduled_at, m.meeting_id.as_str())
                <= (meeting.scheduled_at, meeting.meeting_id.as_str())
        });
        self.meetings.insert(pos, meeting);
    }
}

/// Years a cursor may point at; the `YYYY-MM` form has four year digits.
const YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// One calendar month, used for forward/back navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthCursor {
    first: NaiveDate,
}

impl MonthCursor {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("Month out of range: {}", month);
        }
        if !YEARS.contains(&year) {
            bail!("Year out of range: {} (use {} to {})", year, YEARS.start(), YEARS.end());
        }
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .with_context(|| format!("No such month: {:04}-{:02}", year, month))?;
        Ok(Self { first })
    }

    pub fn containing(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), date.month())
    }

    /// Parse `YYYY-MM`.
    pub fn parse(s: &str) -> Result<Self> {
        let (y, m) = s
            .split_once('-')
            .with_context(|| format!("Expected YYYY-MM, got '{}'", s))?;
        let year = y.parse().with_context(|| format!("Invalid year in '{}'", s))?;
        let month = m.parse().with_context(|| format!("Invalid month in '{}'", s))?;
        Self::new(year, month)
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        // Years stop at 9999, well inside chrono's range
        self.first
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn next(&self) -> Result<Self> {
        let date = self
            .first
            .checked_add_months(Months::new(1))
            .with_context(|| format!("No month after {}", self))?;
        Self::containing(date)
    }

    pub fn prev(&self) -> Result<Self> {
        let date = self
            .first
            .checked_sub_months(Months::new(1))
            .with_context(|| format!("No month before {}", self))?;
        Self::containing(date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.first.year() && date.month() == self.first.month()
    }
}

impl std::fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.first.year(), self.first.month())
    }
}

/// Meetings grouped by local date, for one timezone.
#[derive(Debug, Clone)]
pub struct CalendarIndex<Tz: TimeZone> {
    tz: Tz,
    days: HashMap<NaiveDate, DayEntry>,
    /// Date span the source query covered. Only set explicitly; the
    /// meetings themselves say nothing about empty days around them.
    loaded: Option<(NaiveDate, NaiveDate)>,
}

impl<Tz: TimeZone> CalendarIndex<Tz> {
    pub fn build<'a>(meetings: impl IntoIterator<Item = &'a Meeting>, tz: Tz) -> Self {
        let mut index = Self {
            tz,
            days: HashMap::new(),
            loaded: None,
        };
        for meeting in meetings {
            index.insert(meeting.clone());
        }
        index
    }

    /// Record the date span the underlying query covered, so that months
    /// inside it can be browsed without refetching even when they are empty.
    pub fn with_loaded_range(mut self, first: NaiveDate, last: NaiveDate) -> Self {
        self.loaded = Some((first.min(last), first.max(last)));
        self
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// Add one meeting. Only that meeting's date entry changes.
    pub fn insert(&mut self, meeting: Meeting) {
        let date = self.local_date(meeting.scheduled_at);
        self.days.entry(date).or_default().insert_sorted(meeting);
    }

    pub fn on(&self, date: NaiveDate) -> Option<&DayEntry> {
        self.days.get(&date)
    }

    /// Lookup by `YYYY-MM-DD` key.
    pub fn on_key(&self, key: &str) -> Option<&DayEntry> {
        let date = NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()?;
        self.on(date)
    }

    pub fn count_on(&self, date: NaiveDate) -> usize {
        self.on(date).map_or(0, DayEntry::count)
    }

    pub fn loaded_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.loaded
    }

    /// Whether `month` lies within the loaded range, i.e. browsing it needs no refetch.
    pub fn covers(&self, month: MonthCursor) -> bool {
        match self.loaded_range() {
            Some((first, last)) => first <= month.first_day() && month.last_day() <= last,
            None => false,
        }
    }

    /// Days with meetings in `month`, in date order.
    pub fn month(&self, month: MonthCursor) -> Vec<(NaiveDate, &DayEntry)> {
        let mut days: Vec<_> = self
            .days
            .iter()
            .filter(|(date, _)| month.contains(**date))
            .map(|(date, entry)| (*date, entry))
            .collect();
        days.sort_by_key(|(date, _)| *date);
        days
    }

    /// Key -> entry view, sorted by key.
    pub fn entries(&self) -> Vec<(String, &DayEntry)> {
        let mut out: Vec<_> = self
            .days
            .iter()
            .map(|(date, entry)| (date_key(*date), entry))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn total(&self) -> usize {
        self.days.values().map(DayEntry::count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> Vec<Meeting> {
        vec![
            proposed("b", at(2025, 3, 1, 15, 0, 0)),
            proposed("a", at(2025, 3, 1, 9, 0, 0)),
            proposed("c", at(2025, 3, 2, 23, 30, 0)),
            proposed("d", at(2025, 4, 10, 12, 0, 0)),
        ]
    }

    fn ids(entry: &DayEntry) -> Vec<&str> {
        entry.meetings.iter().map(|m| m.meeting_id.as_str()).collect()
    }

    #[test]
    fn test_groups_by_date_in_order() {
        let meetings = sample();
        let index = CalendarIndex::build(&meetings, Utc);
        let first = index.on_key("2025-03-01").unwrap();
        assert_eq!(ids(first), vec!["a", "b"]);
        assert_eq!(first.count(), 2);
        assert_eq!(index.count_on(date(2025, 3, 2)), 1);
        assert_eq!(index.count_on(date(2025, 3, 3)), 0);
        assert_eq!(index.total(), 4);
        assert!(index.on_key("not-a-date").is_none());
    }

    #[test]
    fn test_timezone_shifts_day() {
        let meetings = sample();
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        let index = CalendarIndex::build(&meetings, plus_one);
        // 23:30 UTC on the 2nd is 00:30 on the 3rd at UTC+1
        assert_eq!(index.count_on(date(2025, 3, 2)), 0);
        assert_eq!(ids(index.on(date(2025, 3, 3)).unwrap()), vec!["c"]);
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let meetings = sample();
        let a = CalendarIndex::build(&meetings, Utc);
        let b = CalendarIndex::build(&meetings, Utc);
        assert_eq!(a.entries(), b.entries());
    }

    #[test]
    fn test_insert_only_touches_its_day() {
        let meetings = sample();
        let before = CalendarIndex::build(&meetings, Utc);
        let mut after = before.clone();
        after.insert(proposed("e", at(2025, 3, 1, 12, 0, 0)));

        for (key, entry) in before.entries() {
            if key == "2025-03-01" {
                assert_eq!(ids(after.on_key(&key).unwrap()), vec!["a", "e", "b"]);
            } else {
                assert_eq!(after.on_key(&key), Some(entry));
            }
        }
        assert_eq!(after.entries().len(), before.entries().len());
    }

    #[test]
    fn test_month_navigation() {
        let meetings = sample();
        let index = CalendarIndex::build(&meetings, Utc)
            .with_loaded_range(date(2025, 1, 1), date(2025, 6, 30));

        let march = MonthCursor::parse("2025-03").unwrap();
        let days: Vec<_> = index.month(march).into_iter().map(|(d, _)| d).collect();
        assert_eq!(days, vec![date(2025, 3, 1), date(2025, 3, 2)]);

        let april = march.next().unwrap();
        assert_eq!(april.to_string(), "2025-04");
        assert_eq!(index.month(april).len(), 1);
        assert_eq!(april.prev().unwrap(), march);

        assert!(index.covers(march.prev().unwrap()));
        assert!(!index.covers(MonthCursor::new(2025, 7).unwrap()));
    }

    #[test]
    fn test_month_cursor_edges() {
        let dec = MonthCursor::new(2024, 12).unwrap();
        assert_eq!(dec.next().unwrap(), MonthCursor::new(2025, 1).unwrap());
        assert_eq!(MonthCursor::new(2025, 1).unwrap().prev().unwrap(), dec);
        assert_eq!(MonthCursor::new(2024, 2).unwrap().last_day(), date(2024, 2, 29));
        assert!(MonthCursor::new(2025, 13).is_err());
        assert!(MonthCursor::parse("2025").is_err());
    }

    #[test]
    fn test_month_cursor_year_bounds() {
        assert!(MonthCursor::parse("262143-12").is_err());
        assert!(MonthCursor::parse("0-01").is_err());
        assert!(MonthCursor::new(10000, 1).is_err());

        let last = MonthCursor::parse("9999-12").unwrap();
        assert_eq!(last.last_day(), date(9999, 12, 31));
        assert!(last.next().is_err());
        assert_eq!(last.prev().unwrap().to_string(), "9999-11");

        let first = MonthCursor::new(1, 1).unwrap();
        assert_eq!(first.first_day(), date(1, 1, 1));
        assert!(first.prev().is_err());
        assert_eq!(first.to_string(), "0001-01");
    }

    #[test]
    fn test_containing_rejects_dates_past_cursor_range() {
        assert_eq!(
            MonthCursor::containing(date(2025, 3, 17)).unwrap(),
            MonthCursor::new(2025, 3).unwrap()
        );
        assert!(MonthCursor::containing(NaiveDate::MAX).is_err());
    }

    #[test]
    fn test_range_without_explicit_bounds() {
        let meetings = sample();
        let index = CalendarIndex::build(&meetings, Utc);
        // Meetings alone do not say which empty days were fetched
        assert_eq!(index.loaded_range(), None);
        assert!(!index.covers(MonthCursor::new(2025, 3).unwrap()));

        let index = index.with_loaded_range(date(2025, 3, 1), date(2025, 4, 30));
        assert!(index.covers(MonthCursor::new(2025, 3).unwrap()));
        assert!(index.covers(MonthCursor::new(2025, 4).unwrap()));
        assert!(!index.covers(MonthCursor::new(2025, 5).unwrap()));
    }
}
