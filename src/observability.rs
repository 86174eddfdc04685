use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "rentcal_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "rentcal_query_duration_seconds";

/// Counter: bookings refused because the range was already taken.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "rentcal_reservation_conflicts_total";

// ── Connection metrics ────────────────────────────────────────────

/// Gauge: open client connections.
pub const CONNECTIONS_ACTIVE: &str = "rentcal_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "rentcal_connections_total";

/// Counter: connections turned away at the connection limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "rentcal_connections_rejected_total";

/// Gauge: teams with a loaded engine.
pub const TEAMS_ACTIVE: &str = "rentcal_teams_active";

/// Counter: startup or authentication failures.
pub const AUTH_FAILURES_TOTAL: &str = "rentcal_auth_failures_total";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "rentcal_wal_compactions_total";

/// Histogram: group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rentcal_wal_flush_duration_seconds";

/// Histogram: events per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "rentcal_wal_flush_batch_size";

/// Serve Prometheus metrics on `port`. Nothing happens without a port.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://{addr}/metrics");
    Ok(())
}

/// Short metric label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertCar { .. } => "insert_car",
        Command::UpdateCar { .. } => "update_car",
        Command::DeleteCar { .. } => "delete_car",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectCars => "select_cars",
        Command::SelectCarSummary => "select_car_summary",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectMonthGrid { .. } => "select_month_grid",
        Command::SelectTimeline { .. } => "select_timeline",
        Command::SelectDisabledDays { .. } => "select_disabled_days",
        Command::SelectDailyReservations { .. } => "select_daily_reservations",
    }
}
