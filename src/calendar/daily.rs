use crate::model::*;

use super::interval::{clamp_to_month, days_between, enumerate_days};

/// Reservations active on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    pub day: Day,
    pub count: u32,
}

/// Per-day count of active reservations over `window`, one entry per day
/// including zero days. Sweep line: +1 on the first clamped day, -1 after the
/// last.
pub fn daily_occupancy(window: &DateRange, reservations: &[Reservation]) -> Vec<DailyCount> {
    if window.from > window.to {
        return Vec::new();
    }
    let len = window.len_days() as usize;
    let mut deltas: Vec<i64> = vec![0; len + 1];

    for r in reservations {
        let Some(clamped) = clamp_to_month(&r.range, window.from, window.to) else {
            continue;
        };
        deltas[days_between(window.from, clamped.from) as usize] += 1;
        deltas[days_between(window.from, clamped.to) as usize + 1] -= 1;
    }

    let mut running = 0i64;
    enumerate_days(*window)
        .zip(deltas)
        .map(|(day, delta)| {
            running += delta;
            DailyCount {
                day,
                count: running as u32,
            }
        })
        .collect()
}
