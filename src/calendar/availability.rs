use std::collections::BTreeSet;

use crate::model::*;

use super::interval::{enumerate_days, overlaps};

// ── Availability Checks ──────────────────────────────────────────
//
// `existing` is the snapshot of one car's reservations. Every check uses the
// closed-interval policy: a candidate that shares a single boundary day with
// an existing reservation is blocked.

/// True if `date` falls inside any existing reservation.
pub fn is_blocked(date: Day, existing: &[Reservation]) -> bool {
    existing.iter().any(|r| r.range.contains(date))
}

/// True iff no day of `candidate` is blocked.
pub fn is_range_available(candidate: &DateRange, existing: &[Reservation]) -> bool {
    enumerate_days(*candidate).all(|day| !is_blocked(day, existing))
}

/// The earliest-starting reservation that blocks `candidate`, if any.
pub fn first_conflict<'a>(candidate: &DateRange, existing: &'a [Reservation]) -> Option<&'a Reservation> {
    existing
        .iter()
        .filter(|r| overlaps(&r.range, candidate))
        .min_by_key(|r| (r.range.from, r.id))
}

/// Every reserved day, i.e. the date picker's disabled set.
pub fn disabled_days(existing: &[Reservation]) -> BTreeSet<Day> {
    existing
        .iter()
        .flat_map(|r| enumerate_days(r.range))
        .collect()
}
