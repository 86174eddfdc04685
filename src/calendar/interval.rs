use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::model::{DateRange, Day};

// ── Day arithmetic ───────────────────────────────────────────────

/// Signed number of days from `a` to `b` (`b - a`).
pub fn days_between(a: Day, b: Day) -> i64 {
    b.signed_duration_since(a).num_days()
}

/// Column of `day` in a week that starts on Sunday (Sunday = 0).
pub fn weekday_index(day: Day) -> usize {
    day.weekday().num_days_from_sunday() as usize
}

/// First and last day of the month containing `anchor`.
pub fn month_bounds(anchor: Day) -> (Day, Day) {
    let first = anchor - Duration::days(i64::from(anchor.day0()));
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    (first, last)
}

/// First day of the month `n` months away from the one containing `anchor`.
/// `None` only when the result leaves chrono's representable range.
pub fn add_months(anchor: Day, n: i32) -> Option<Day> {
    let (first, _) = month_bounds(anchor);
    if n >= 0 {
        first.checked_add_months(Months::new(n as u32))
    } else {
        first.checked_sub_months(Months::new(n.unsigned_abs()))
    }
}

// ── Range operations ─────────────────────────────────────────────

/// Closed intervals intersect. Sharing a boundary day counts.
pub fn overlaps(a: &DateRange, b: &DateRange) -> bool {
    a.from <= b.to && b.from <= a.to
}

/// Every day from `range.from` to `range.to` inclusive, in order.
pub fn enumerate_days(range: DateRange) -> impl DoubleEndedIterator<Item = Day> {
    let len = days_between(range.from, range.to);
    (0..=len).map(move |i| range.from + Duration::days(i))
}

/// Intersect `range` with `[month_start, month_end]`; `None` when disjoint.
pub fn clamp_to_month(range: &DateRange, month_start: Day, month_end: Day) -> Option<DateRange> {
    let from = range.from.max(month_start);
    let to = range.to.min(month_end);
    if from > to {
        return None;
    }
    Some(DateRange { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn r(from: Day, to: Day) -> DateRange {
        DateRange::new(from, to).unwrap()
    }

    #[test]
    fn days_between_signed() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 1, 5)), 4);
        assert_eq!(days_between(d(2024, 1, 5), d(2024, 1, 1)), -4);
        assert_eq!(days_between(d(2024, 2, 28), d(2024, 3, 1)), 2); // leap year
    }

    #[test]
    fn weekday_index_sunday_first() {
        assert_eq!(weekday_index(d(2024, 9, 1)), 0); // Sunday
        assert_eq!(weekday_index(d(2024, 9, 7)), 6); // Saturday
        assert_eq!(weekday_index(d(2023, 2, 1)), 3); // Wednesday
    }

    #[test]
    fn month_bounds_handles_lengths() {
        assert_eq!(month_bounds(d(2023, 2, 14)), (d(2023, 2, 1), d(2023, 2, 28)));
        assert_eq!(month_bounds(d(2024, 2, 29)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month_bounds(d(2024, 12, 31)), (d(2024, 12, 1), d(2024, 12, 31)));
        assert_eq!(month_bounds(d(2024, 4, 1)), (d(2024, 4, 1), d(2024, 4, 30)));
    }

    #[test]
    fn add_months_navigates() {
        assert_eq!(add_months(d(2024, 1, 31), 1), Some(d(2024, 2, 1)));
        assert_eq!(add_months(d(2024, 1, 15), -1), Some(d(2023, 12, 1)));
        assert_eq!(add_months(d(2024, 3, 3), 0), Some(d(2024, 3, 1)));
        assert_eq!(add_months(d(2024, 11, 3), 14), Some(d(2026, 1, 1)));
    }

    #[test]
    fn overlap_boundary_counts() {
        assert!(overlaps(&r(d(2024, 1, 1), d(2024, 1, 5)), &r(d(2024, 1, 5), d(2024, 1, 10))));
        assert!(!overlaps(&r(d(2024, 1, 1), d(2024, 1, 4)), &r(d(2024, 1, 5), d(2024, 1, 10))));
        assert!(overlaps(&r(d(2024, 1, 1), d(2024, 1, 31)), &r(d(2024, 1, 10), d(2024, 1, 11))));
    }

    #[test]
    fn overlap_is_symmetric() {
        let ranges = [
            r(d(2024, 1, 1), d(2024, 1, 5)),
            r(d(2024, 1, 5), d(2024, 1, 10)),
            r(d(2024, 1, 6), d(2024, 1, 6)),
            r(d(2023, 12, 20), d(2024, 2, 1)),
            r(d(2024, 3, 1), d(2024, 3, 3)),
        ];
        for a in &ranges {
            for b in &ranges {
                assert_eq!(overlaps(a, b), overlaps(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn enumerate_days_length_and_order() {
        let range = r(d(2024, 2, 27), d(2024, 3, 2));
        let days: Vec<Day> = enumerate_days(range).collect();
        assert_eq!(days.len() as i64, days_between(range.from, range.to) + 1);
        assert_eq!(days.first(), Some(&d(2024, 2, 27)));
        assert_eq!(days.last(), Some(&d(2024, 3, 2)));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn enumerate_days_is_restartable() {
        let range = r(d(2024, 1, 1), d(2024, 1, 3));
        let first: Vec<Day> = enumerate_days(range).collect();
        let second: Vec<Day> = enumerate_days(range).collect();
        assert_eq!(first, second);
        assert_eq!(enumerate_days(DateRange::single(d(2024, 1, 1))).count(), 1);
    }

    #[test]
    fn clamp_inside_straddling_and_outside() {
        let (start, end) = month_bounds(d(2024, 3, 1));
        assert_eq!(
            clamp_to_month(&r(d(2024, 2, 25), d(2024, 3, 4)), start, end),
            Some(r(d(2024, 3, 1), d(2024, 3, 4)))
        );
        assert_eq!(
            clamp_to_month(&r(d(2024, 3, 30), d(2024, 4, 2)), start, end),
            Some(r(d(2024, 3, 30), d(2024, 3, 31)))
        );
        assert_eq!(
            clamp_to_month(&r(d(2024, 3, 10), d(2024, 3, 12)), start, end),
            Some(r(d(2024, 3, 10), d(2024, 3, 12)))
        );
        assert_eq!(clamp_to_month(&r(d(2024, 4, 1), d(2024, 4, 2)), start, end), None);
        assert_eq!(clamp_to_month(&r(d(2024, 1, 1), d(2024, 2, 29)), start, end), None);
    }
}
