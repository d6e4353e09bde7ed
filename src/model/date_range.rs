//! `[earliest, latest]` instant ranges merged bottom-up through the folder tree.

use chrono::{DateTime, Utc};

/// A nullable `[start, end]` pair.
///
/// The range is *defined* once at least one bound has been set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DateRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// A range covering exactly one instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            start: Some(instant),
            end: Some(instant),
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_defined(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Widen the range to include `instant`. `None` leaves it unchanged.
    pub fn extend(&mut self, instant: Option<DateTime<Utc>>) {
        if let Some(instant) = instant {
            self.merge(&Self::at(instant));
        }
    }

    /// Pointwise min of starts, max of ends.
    pub fn merge(&mut self, other: &DateRange) {
        self.start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_undefined_by_default() {
        let range = DateRange::new();
        assert!(!range.is_defined());
        assert_eq!(range.start(), None);
    }

    #[test]
    fn test_extend_widens() {
        let mut range = DateRange::new();
        range.extend(Some(day(10)));
        range.extend(None);
        range.extend(Some(day(3)));
        range.extend(Some(day(7)));
        assert_eq!(range.start(), Some(day(3)));
        assert_eq!(range.end(), Some(day(10)));
    }

    #[test]
    fn test_merge_with_undefined_is_identity() {
        let mut range = DateRange::at(day(5));
        range.merge(&DateRange::new());
        assert_eq!(range, DateRange::at(day(5)));

        let mut empty = DateRange::new();
        empty.merge(&DateRange::at(day(5)));
        assert_eq!(empty, DateRange::at(day(5)));
    }

    #[test]
    fn test_merge_pointwise() {
        let mut a = DateRange::at(day(4));
        a.extend(Some(day(6)));
        let mut b = DateRange::at(day(2));
        b.extend(Some(day(5)));
        a.merge(&b);
        assert_eq!(a.start(), Some(day(2)));
        assert_eq!(a.end(), Some(day(6)));
    }
}
