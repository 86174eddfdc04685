pub const MAX_CARS_PER_TEAM: usize = 10_000;
pub const MAX_RESERVATIONS_PER_CAR: usize = 50_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CUSTOMER_FIELD_LEN: usize = 512;
/// Longest single reservation, in days.
pub const MAX_RESERVATION_DAYS: i64 = 366;
/// Widest window for fetch and occupancy queries, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3 * 366;
pub const MIN_VALID_YEAR: i32 = 1970;
pub const MAX_VALID_YEAR: i32 = 9999;
pub const MAX_TEAMS: usize = 1_000;
pub const MAX_TEAM_NAME_LEN: usize = 128;
/// Largest WAL record payload, in bytes. Longer length prefixes are read as corruption.
pub const MAX_WAL_RECORD_LEN: usize = 1 << 20;
