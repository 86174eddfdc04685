use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::Engine;
use crate::error::GatewayError;
use crate::model::*;

/// Persistence boundary for reservations. Consumers only ever hold the
/// snapshots this returns.
#[async_trait]
pub trait ReservationGateway: Send + Sync {
    /// Reservations in `scope` overlapping `window`, or all of them when no
    /// window is given.
    async fn fetch_reservations(
        &self,
        scope: CarScope,
        window: Option<DateRange>,
    ) -> Result<Vec<Reservation>, GatewayError>;

    /// Commit a candidate. The gateway re-checks availability itself, so a
    /// stale client snapshot yields `AvailabilityConflict` instead of a
    /// double booking.
    async fn create_reservation(&self, candidate: NewReservation)
        -> Result<Reservation, GatewayError>;

    async fn delete_reservation(&self, id: Ulid) -> Result<(), GatewayError>;

    async fn list_cars(&self) -> Result<Vec<Car>, GatewayError>;
}

#[async_trait]
impl ReservationGateway for Engine {
    async fn fetch_reservations(
        &self,
        scope: CarScope,
        window: Option<DateRange>,
    ) -> Result<Vec<Reservation>, GatewayError> {
        self.get_reservations(scope, window).await.map_err(|e| {
            tracing::warn!("fetch reservations failed: {e}");
            GatewayError::DataUnavailable(e.to_string())
        })
    }

    async fn create_reservation(
        &self,
        candidate: NewReservation,
    ) -> Result<Reservation, GatewayError> {
        Ok(Engine::create_reservation(self, Ulid::new(), candidate).await?)
    }

    async fn delete_reservation(&self, id: Ulid) -> Result<(), GatewayError> {
        Engine::delete_reservation(self, id).await?;
        Ok(())
    }

    async fn list_cars(&self) -> Result<Vec<Car>, GatewayError> {
        Ok(Engine::list_cars(self).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::notify::NotifyHub;

    fn d(m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn engine(name: &str) -> Engine {
        let dir = std::env::temp_dir().join("rentcal_test_gateway");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        Engine::new(path, Arc::new(NotifyHub::new())).unwrap()
    }

    fn candidate(car_id: Ulid, from: Day, to: Day) -> NewReservation {
        NewReservation {
            car_id,
            range: DateRange::new(from, to).unwrap(),
            customer_name: "Eva".into(),
            customer_phone: "0687654321".into(),
            customer_email: "eva@example.com".into(),
            booked_by: None,
        }
    }

    #[tokio::test]
    async fn overlapping_create_is_availability_conflict() {
        let engine = engine("conflict.wal");
        let car = Ulid::new();
        engine
            .create_car(car, "Up".into(), None, None, CarStatus::Available)
            .await
            .unwrap();
        let gw: &dyn ReservationGateway = &engine;

        let first = gw.create_reservation(candidate(car, d(1, 5), d(1, 10))).await.unwrap();
        let err = gw
            .create_reservation(candidate(car, d(1, 10), d(1, 12)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::AvailabilityConflict {
                car_id: Some(car),
                conflicting: Some(first.id),
            }
        );
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let engine = engine("not_found.wal");
        let id = Ulid::new();
        let err = ReservationGateway::delete_reservation(&engine, id)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotFound(id));
    }

    #[tokio::test]
    async fn inverted_or_blank_candidates_are_validation_errors() {
        let engine = engine("validation.wal");
        let car = Ulid::new();
        engine
            .create_car(car, "Up".into(), None, None, CarStatus::Available)
            .await
            .unwrap();
        let mut c = candidate(car, d(2, 1), d(2, 2));
        c.customer_name = "   ".into();
        let err = ReservationGateway::create_reservation(&engine, c)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Validation("Please fill in all fields".into()));
    }

    #[tokio::test]
    async fn fetch_with_window_returns_overlaps() {
        let engine = engine("fetch.wal");
        let car = Ulid::new();
        engine
            .create_car(car, "Up".into(), None, None, CarStatus::Available)
            .await
            .unwrap();
        ReservationGateway::create_reservation(&engine, candidate(car, d(3, 30), d(4, 2)))
            .await
            .unwrap();
        let april = DateRange::new(d(4, 1), d(4, 30)).unwrap();
        let got = engine
            .fetch_reservations(CarScope::Car(car), Some(april))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(ReservationGateway::list_cars(&engine).await.unwrap().len(), 1);
    }
}
