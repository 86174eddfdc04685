use std::collections::{BTreeMap, HashMap};

use ulid::Ulid;

use crate::model::*;

use super::interval::{days_between, month_bounds};

/// Group key for reservations whose car cannot be resolved.
pub const UNKNOWN_CAR: &str = "Unknown";

/// Resolves a car id to its display name.
pub trait CarLookup {
    fn car_name(&self, id: &Ulid) -> Option<&str>;
}

impl CarLookup for HashMap<Ulid, String> {
    fn car_name(&self, id: &Ulid) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

impl CarLookup for [Car] {
    fn car_name(&self, id: &Ulid) -> Option<&str> {
        self.iter().find(|c| c.id == *id).map(|c| c.name.as_str())
    }
}

impl CarLookup for Vec<Car> {
    fn car_name(&self, id: &Ulid) -> Option<&str> {
        self.as_slice().car_name(id)
    }
}

/// One horizontal bar, in day units from the month's first day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineBar {
    pub car_name: String,
    /// Clamped to >= 0.
    pub start_offset: i64,
    /// Clamped to the month end; >= 1.
    pub duration: i64,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub month_start: Day,
    pub month_end: Day,
    pub days_in_month: i64,
    /// Ordered by car name.
    pub groups: BTreeMap<String, Vec<TimelineBar>>,
    /// Offset of `today` when it falls inside the month.
    pub today_marker: Option<i64>,
}

impl Timeline {
    pub fn bar_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Lay out the month containing `anchor`. Reservations that do not touch the
/// month are skipped; the rest are clamped to its edges.
pub fn build_timeline<L>(anchor: Day, reservations: &[Reservation], lookup: &L, today: Day) -> Timeline
where
    L: CarLookup + ?Sized,
{
    let (month_start, month_end) = month_bounds(anchor);
    let mut groups: BTreeMap<String, Vec<TimelineBar>> = BTreeMap::new();

    for reservation in reservations {
        let start_offset = days_between(month_start, reservation.range.from).max(0);
        let effective_end = reservation.range.to.min(month_end);
        let duration = days_between(month_start, effective_end) - start_offset + 1;
        if duration < 1 {
            continue;
        }

        let car_name = lookup
            .car_name(&reservation.car_id)
            .unwrap_or(UNKNOWN_CAR)
            .to_string();
        groups.entry(car_name.clone()).or_default().push(TimelineBar {
            car_name,
            start_offset,
            duration,
            reservation: reservation.clone(),
        });
    }

    for bars in groups.values_mut() {
        bars.sort_by_key(|b| (b.start_offset, b.reservation.id));
    }

    let today_marker = (month_start <= today && today <= month_end)
        .then(|| days_between(month_start, today));

    Timeline {
        month_start,
        month_end,
        days_in_month: days_between(month_start, month_end) + 1,
        groups,
        today_marker,
    }
}
