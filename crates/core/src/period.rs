use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive span of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Smallest range covering every date yielded, or `None` when empty.
    pub fn spanning<I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        dates.into_iter().fold(None, |acc, date| match acc {
            None => Some(DateRange::new(date, date)),
            Some(r) => Some(DateRange::new(r.start.min(date), r.end.max(date))),
        })
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn is_single_day(self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_range_contains() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 12, 31));
        assert!(range.contains(d(2024, 6, 15)));
        assert!(range.contains(d(2024, 1, 1))); // inclusive start
        assert!(range.contains(d(2024, 12, 31))); // inclusive end
        assert!(!range.contains(d(2023, 12, 31)));
        assert!(!range.contains(d(2025, 1, 1)));
    }

    #[test]
    fn date_range_display() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 12, 31));
        assert_eq!(range.to_string(), "2024-01-01 to 2024-12-31");
    }

    #[test]
    fn spanning_finds_min_and_max() {
        let range = DateRange::spanning([d(2024, 3, 5), d(2024, 1, 20), d(2024, 2, 1)]).unwrap();
        assert_eq!(range, DateRange::new(d(2024, 1, 20), d(2024, 3, 5)));
    }

    #[test]
    fn spanning_single_day_is_inclusive() {
        let range = DateRange::spanning([d(2024, 1, 25), d(2024, 1, 25)]).unwrap();
        assert!(range.is_single_day());
        assert!(range.contains(d(2024, 1, 25)));
    }

    #[test]
    fn spanning_nothing_is_none() {
        assert!(DateRange::spanning(std::iter::empty()).is_none());
    }
}
