//! Pure reservation calendar logic: interval math, availability checks,
//! month grid and timeline layout, daily occupancy. No I/O, no hidden state;
//! callers pass snapshots and get fresh values back.

mod availability;
mod daily;
mod grid;
mod interval;
mod timeline;

pub use availability::{disabled_days, first_conflict, is_blocked, is_range_available};
pub use daily::{daily_occupancy, DailyCount};
pub use grid::{build_month_grid, MonthGrid, MonthGridCell, DEFAULT_VISIBLE_PER_CELL};
pub use interval::{
    add_months, clamp_to_month, days_between, enumerate_days, month_bounds, overlaps, weekday_index,
};
pub use timeline::{build_timeline, CarLookup, Timeline, TimelineBar, UNKNOWN_CAR};
