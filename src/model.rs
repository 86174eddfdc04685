use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ValidationError;

/// A calendar day. Time-of-day is dropped on ingest.
pub type Day = NaiveDate;

/// Closed interval `[from, to]` of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Day,
    pub to: Day,
}

impl DateRange {
    pub fn new(from: Day, to: Day) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::new(format!(
                "invalid range: {from} is after {to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single(day: Day) -> Self {
        Self { from: day, to: day }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, day: Day) -> bool {
        self.from <= day && day <= self.to
    }

    pub fn len_days(&self) -> i64 {
        self.to.signed_duration_since(self.from).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarStatus {
    Available,
    Occupied,
    Repair,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Available => "available",
            CarStatus::Occupied => "occupied",
            CarStatus::Repair => "repair",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(CarStatus::Available),
            "occupied" => Some(CarStatus::Occupied),
            "repair" => Some(CarStatus::Repair),
            _ => None,
        }
    }
}

/// A rentable car as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: Ulid,
    pub name: String,
    pub number_plate: Option<String>,
    pub mileage: Option<u32>,
    pub status: CarStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub car_id: Ulid,
    pub range: DateRange,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    /// Session user that created the reservation.
    pub booked_by: Option<String>,
}

/// A reservation that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub car_id: Ulid,
    pub range: DateRange,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub booked_by: Option<String>,
}

impl NewReservation {
    pub fn into_reservation(self, id: Ulid) -> Reservation {
        Reservation {
            id,
            car_id: self.car_id,
            range: self.range,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_email: self.customer_email,
            booked_by: self.booked_by,
        }
    }
}

/// Column changes for a partial car update. `None` leaves a column as is;
/// `Some(None)` clears a nullable one.
#[derive(Debug, Default, PartialEq)]
pub struct CarChanges {
    pub name: Option<String>,
    pub number_plate: Option<Option<String>>,
    pub mileage: Option<Option<u32>>,
    pub status: Option<CarStatus>,
}

impl CarChanges {
    pub fn apply(self, mut car: Car) -> Car {
        if let Some(name) = self.name {
            car.name = name;
        }
        if let Some(plate) = self.number_plate {
            car.number_plate = plate;
        }
        if let Some(mileage) = self.mileage {
            car.mileage = mileage;
        }
        if let Some(status) = self.status {
            car.status = status;
        }
        car
    }
}

/// Which cars a reservation fetch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarScope {
    All,
    Car(Ulid),
}

#[derive(Debug, Clone)]
pub struct CarState {
    pub id: Ulid,
    pub name: String,
    pub number_plate: Option<String>,
    pub mileage: Option<u32>,
    pub status: CarStatus,
    /// Sorted by `range.from`.
    pub reservations: Vec<Reservation>,
}

impl CarState {
    pub fn new(
        id: Ulid,
        name: String,
        number_plate: Option<String>,
        mileage: Option<u32>,
        status: CarStatus,
    ) -> Self {
        Self {
            id,
            name,
            number_plate,
            mileage,
            status,
            reservations: Vec::new(),
        }
    }

    pub fn info(&self) -> Car {
        Car {
            id: self.id,
            name: self.name.clone(),
            number_plate: self.number_plate.clone(),
            mileage: self.mileage,
            status: self.status,
        }
    }

    /// Insert keeping the `range.from` order.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.range.from <= reservation.range.from);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose closed interval intersects `window`.
    /// Everything at index >= right_bound starts after `window.to`.
    pub fn overlapping(&self, window: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.from <= window.to);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.to >= window.from)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CarCreated {
        id: Ulid,
        name: String,
        number_plate: Option<String>,
        mileage: Option<u32>,
        status: CarStatus,
    },
    CarUpdated {
        id: Ulid,
        name: String,
        number_plate: Option<String>,
        mileage: Option<u32>,
        status: CarStatus,
    },
    CarDeleted {
        id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationDeleted {
        id: Ulid,
        car_id: Ulid,
    },
}

impl Event {
    /// The car whose state this event changes.
    pub fn car_id(&self) -> Ulid {
        match self {
            Event::CarCreated { id, .. }
            | Event::CarUpdated { id, .. }
            | Event::CarDeleted { id } => *id,
            Event::ReservationCreated { reservation } => reservation.car_id,
            Event::ReservationDeleted { car_id, .. } => *car_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarSummary {
    pub total: usize,
    pub available: usize,
}
