use crate::model::*;

use super::interval::{enumerate_days, month_bounds, weekday_index};

/// How many reservations a calendar cell shows before "+N more".
pub const DEFAULT_VISIBLE_PER_CELL: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthGridCell {
    /// Leading blank that aligns day 1 to its weekday column.
    Padding,
    Day {
        date: Day,
        reservations: Vec<Reservation>,
    },
}

impl MonthGridCell {
    pub fn date(&self) -> Option<Day> {
        match self {
            MonthGridCell::Padding => None,
            MonthGridCell::Day { date, .. } => Some(*date),
        }
    }

    /// Full list, never truncated.
    pub fn reservations(&self) -> &[Reservation] {
        match self {
            MonthGridCell::Padding => &[],
            MonthGridCell::Day { reservations, .. } => reservations,
        }
    }

    pub fn visible(&self, limit: usize) -> &[Reservation] {
        let all = self.reservations();
        &all[..all.len().min(limit)]
    }

    /// The "+N more" count.
    pub fn overflow(&self, limit: usize) -> usize {
        self.reservations().len().saturating_sub(limit)
    }
}

/// Sunday-aligned month grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    pub month_start: Day,
    pub month_end: Day,
    pub cells: Vec<MonthGridCell>,
}

impl MonthGrid {
    pub fn leading_padding(&self) -> usize {
        self.cells
            .iter()
            .take_while(|c| matches!(c, MonthGridCell::Padding))
            .count()
    }

    pub fn day_cells(&self) -> impl Iterator<Item = &MonthGridCell> {
        self.cells
            .iter()
            .filter(|c| matches!(c, MonthGridCell::Day { .. }))
    }

    /// Rows of seven; the last row may be short.
    pub fn weeks(&self) -> impl Iterator<Item = &[MonthGridCell]> {
        self.cells.chunks(7)
    }

    pub fn cell_for(&self, date: Day) -> Option<&MonthGridCell> {
        if date < self.month_start || date > self.month_end {
            return None;
        }
        let idx = self.leading_padding() + date.signed_duration_since(self.month_start).num_days() as usize;
        self.cells.get(idx)
    }
}

/// Lay out the month containing `anchor` and attach every reservation whose
/// closed interval contains each day.
pub fn build_month_grid(anchor: Day, reservations: &[Reservation]) -> MonthGrid {
    let (month_start, month_end) = month_bounds(anchor);
    let month = DateRange {
        from: month_start,
        to: month_end,
    };

    // Only reservations touching the month can land in a cell.
    let mut relevant: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.range.from <= month_end && r.range.to >= month_start)
        .collect();
    relevant.sort_by_key(|r| (r.range.from, r.id));

    let padding = weekday_index(month_start);
    let mut cells = Vec::with_capacity(padding + 31);
    cells.extend(std::iter::repeat_n(MonthGridCell::Padding, padding));

    for date in enumerate_days(month) {
        let on_day = relevant
            .iter()
            .filter(|r| r.range.contains(date))
            .map(|r| (*r).clone())
            .collect();
        cells.push(MonthGridCell::Day {
            date,
            reservations: on_day,
        });
    }

    MonthGrid {
        month_start,
        month_end,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn booked(from: Day, to: Day) -> Reservation {
        Reservation {
            id: Ulid::new(),
            car_id: Ulid::nil(),
            range: DateRange::new(from, to).unwrap(),
            customer_name: "Jan".into(),
            customer_phone: "0612345678".into(),
            customer_email: "jan@example.com".into(),
            booked_by: None,
        }
    }

    #[test]
    fn february_non_leap_empty() {
        let grid = build_month_grid(d(2023, 2, 14), &[]);
        let padding = weekday_index(d(2023, 2, 1));
        assert_eq!(padding, 3);
        assert_eq!(grid.leading_padding(), padding);
        assert_eq!(grid.day_cells().count(), 28);
        assert_eq!(grid.cells.len(), padding + 28);
        assert!(grid.cells.iter().all(|c| c.reservations().is_empty()));
    }

    #[test]
    fn month_starting_sunday_has_no_padding() {
        let grid = build_month_grid(d(2024, 9, 15), &[]);
        assert_eq!(grid.leading_padding(), 0);
        assert_eq!(grid.cells[0].date(), Some(d(2024, 9, 1)));
        assert_eq!(grid.day_cells().count(), 30);
    }

    #[test]
    fn reservations_bucketed_inclusively() {
        let straddling = booked(d(2024, 2, 27), d(2024, 3, 2));
        let inside = booked(d(2024, 3, 2), d(2024, 3, 3));
        let elsewhere = booked(d(2024, 4, 1), d(2024, 4, 2));
        let grid = build_month_grid(d(2024, 3, 1), &[straddling.clone(), inside.clone(), elsewhere]);

        let ids = |day: Day| -> Vec<Ulid> {
            grid.cell_for(day)
                .unwrap()
                .reservations()
                .iter()
                .map(|r| r.id)
                .collect()
        };
        assert_eq!(ids(d(2024, 3, 1)), vec![straddling.id]);
        assert_eq!(ids(d(2024, 3, 2)), vec![straddling.id, inside.id]);
        assert_eq!(ids(d(2024, 3, 3)), vec![inside.id]);
        assert!(ids(d(2024, 3, 4)).is_empty());
    }

    #[test]
    fn overflow_is_display_only() {
        let day = d(2024, 5, 10);
        let many: Vec<Reservation> = (0..5).map(|_| booked(day, day)).collect();
        let grid = build_month_grid(day, &many);
        let cell = grid.cell_for(day).unwrap();
        assert_eq!(cell.reservations().len(), 5);
        assert_eq!(cell.visible(DEFAULT_VISIBLE_PER_CELL).len(), 3);
        assert_eq!(cell.overflow(DEFAULT_VISIBLE_PER_CELL), 2);
        assert_eq!(cell.overflow(10), 0);
        assert_eq!(MonthGridCell::Padding.overflow(0), 0);
    }

    #[test]
    fn weeks_chunk_by_seven() {
        // March 2024 starts on Friday: 5 blanks + 31 days = 36 cells
        let grid = build_month_grid(d(2024, 3, 1), &[]);
        let weeks: Vec<&[MonthGridCell]> = grid.weeks().collect();
        assert_eq!(weeks.len(), 6);
        assert!(weeks[..5].iter().all(|w| w.len() == 7));
        assert_eq!(weeks[5].len(), 1);
    }

    #[test]
    fn build_is_idempotent() {
        let rs = vec![
            booked(d(2024, 3, 5), d(2024, 3, 9)),
            booked(d(2024, 2, 20), d(2024, 3, 1)),
        ];
        assert_eq!(build_month_grid(d(2024, 3, 1), &rs), build_month_grid(d(2024, 3, 1), &rs));
    }

    #[test]
    fn cell_for_outside_month() {
        let grid = build_month_grid(d(2024, 3, 1), &[]);
        assert!(grid.cell_for(d(2024, 2, 29)).is_none());
        assert!(grid.cell_for(d(2024, 4, 1)).is_none());
        assert_eq!(grid.cell_for(d(2024, 3, 31)).unwrap().date(), Some(d(2024, 3, 31)));
    }
}
