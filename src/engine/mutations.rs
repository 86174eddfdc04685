use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_customer, validate_name, validate_range};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_car(
        &self,
        id: Ulid,
        name: String,
        number_plate: Option<String>,
        mileage: Option<u32>,
        status: CarStatus,
    ) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        if self.state.len() >= MAX_CARS_PER_TEAM {
            return Err(EngineError::LimitExceeded("too many cars"));
        }
        validate_name(&name)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CarCreated {
            id,
            name: name.clone(),
            number_plate: number_plate.clone(),
            mileage,
            status,
        };
        self.wal_append(&event).await?;
        let cs = CarState::new(id, name, number_plate, mileage, status);
        self.state.insert(id, Arc::new(RwLock::new(cs)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Merge `changes` into the car under its write lock. Returns the car
    /// as stored.
    pub async fn update_car(&self, id: Ulid, changes: CarChanges) -> Result<Car, EngineError> {
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        let mut guard = self.lock_car(id).await?;
        let car = changes.apply(guard.info());
        let event = Event::CarUpdated {
            id,
            name: car.name.clone(),
            number_plate: car.number_plate.clone(),
            mileage: car.mileage,
            status: car.status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(car)
    }

    /// Fails with `HasReservations` while any reservation references the car.
    pub async fn delete_car(&self, id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let guard = self.lock_car(id).await?;
        if !guard.reservations.is_empty() {
            return Err(EngineError::HasReservations(id));
        }

        let event = Event::CarDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        drop(guard);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    /// Validate, then re-check availability under the car's write lock before
    /// committing. Two bookings on the same car can never both pass.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        candidate: NewReservation,
    ) -> Result<Reservation, EngineError> {
        validate_range(&candidate.range)?;
        validate_customer(&candidate)?;
        let car_id = candidate.car_id;
        let mut guard = self.lock_car(car_id).await?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_CAR {
            return Err(EngineError::LimitExceeded("too many reservations on car"));
        }
        if self.reservation_to_car.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        if let Err(e) = check_no_conflict(&guard, &candidate.range) {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            tracing::debug!("booking on car {car_id} rejected: {e}");
            return Err(e);
        }

        let reservation = candidate.into_reservation(id);
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(reservation)
    }

    /// Returns the id of the car the reservation belonged to.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        // The reservation may have gone while we waited for the lock.
        if !guard.reservations.iter().any(|r| r.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let car_id = guard.id;
        let event = Event::ReservationDeleted { id, car_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(car_id)
    }

    /// Rewrite the WAL with one `CarCreated` per car followed by its live
    /// reservations. The catalog lock and every car's read lock are held
    /// until the swap, so no append can land between snapshot and rewrite.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let cars: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        let mut guards = Vec::with_capacity(cars.len());
        for cs in cars {
            let guard = cs.read_owned().await;
            events.push(Event::CarCreated {
                id: guard.id,
                name: guard.name.clone(),
                number_plate: guard.number_plate.clone(),
                mileage: guard.mileage,
                status: guard.status,
            });
            events.extend(guard.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(guards);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
