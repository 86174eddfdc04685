use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Compact the team's WAL once more than `threshold` events were appended
/// since the last compaction. Returns whether it compacted.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends <= threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("WAL compacted after {appends} appends");
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "ok")
                .increment(1);
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "error")
                .increment(1);
            false
        }
    }
}

/// Background loop, one per team.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use ulid::Ulid;

    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rentcal_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let engine = Engine::new(test_wal_path("threshold.wal"), Arc::new(NotifyHub::new())).unwrap();
        let car = Ulid::new();
        engine
            .create_car(car, "Ka".into(), None, None, CarStatus::Available)
            .await
            .unwrap();
        assert!(!compact_if_due(&engine, 3).await);

        for day in 1..=3 {
            let date = NaiveDate::from_ymd_opt(2024, 12, day).unwrap();
            let r = engine
                .create_reservation(
                    Ulid::new(),
                    NewReservation {
                        car_id: car,
                        range: DateRange::single(date),
                        customer_name: "K".into(),
                        customer_phone: "1".into(),
                        customer_email: "k@example.com".into(),
                        booked_by: None,
                    },
                )
                .await
                .unwrap();
            engine.delete_reservation(r.id).await.unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 7);
        assert!(compact_if_due(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
