use std::collections::BTreeSet;

use ulid::Ulid;

use crate::calendar;
use crate::error::GatewayError;
use crate::gateway::ReservationGateway;
use crate::model::*;

const FILL_ALL_FIELDS: &str = "Please fill in all fields";

/// State behind the "new reservation" form. Availability is checked against
/// the snapshot fetched on `select_car`; the gateway re-checks on submit.
pub struct BookingForm<'a, G: ReservationGateway + ?Sized> {
    gateway: &'a G,
    booked_by: Option<String>,
    car_id: Option<Ulid>,
    range: Option<DateRange>,
    snapshot: Vec<Reservation>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
}

impl<'a, G: ReservationGateway + ?Sized> BookingForm<'a, G> {
    pub fn new(gateway: &'a G, booked_by: Option<String>) -> Self {
        Self {
            gateway,
            booked_by,
            car_id: None,
            range: None,
            snapshot: Vec::new(),
            customer_name: String::new(),
            customer_phone: String::new(),
            customer_email: String::new(),
        }
    }

    pub fn car_id(&self) -> Option<Ulid> {
        self.car_id
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    /// Switch cars: clears the chosen range and reloads the car's
    /// reservations. A failed fetch leaves an empty snapshot.
    pub async fn select_car(&mut self, car_id: Ulid) {
        self.car_id = Some(car_id);
        self.range = None;
        self.snapshot = match self
            .gateway
            .fetch_reservations(CarScope::Car(car_id), None)
            .await
        {
            Ok(reservations) => reservations,
            Err(e) => {
                tracing::warn!("could not load reservations for car {car_id}: {e}");
                Vec::new()
            }
        };
    }

    /// Days the date picker should grey out.
    pub fn disabled_days(&self) -> BTreeSet<Day> {
        calendar::disabled_days(&self.snapshot)
    }

    /// Keep `range` only if the snapshot leaves it free; otherwise the
    /// previous choice stays.
    pub fn choose_range(&mut self, range: DateRange) -> Result<(), GatewayError> {
        if let Some(existing) = calendar::first_conflict(&range, &self.snapshot) {
            return Err(GatewayError::AvailabilityConflict {
                car_id: self.car_id,
                conflicting: Some(existing.id),
            });
        }
        self.range = Some(range);
        Ok(())
    }

    pub fn set_customer(
        &mut self,
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
    ) {
        self.customer_name = name.into();
        self.customer_phone = phone.into();
        self.customer_email = email.into();
    }

    fn candidate(&self) -> Result<NewReservation, GatewayError> {
        let blank = [&self.customer_name, &self.customer_phone, &self.customer_email]
            .iter()
            .any(|f| f.trim().is_empty());
        match (self.car_id, self.range) {
            (Some(car_id), Some(range)) if !blank => Ok(NewReservation {
                car_id,
                range,
                customer_name: self.customer_name.trim().to_string(),
                customer_phone: self.customer_phone.trim().to_string(),
                customer_email: self.customer_email.trim().to_string(),
                booked_by: self.booked_by.clone(),
            }),
            _ => Err(GatewayError::Validation(FILL_ALL_FIELDS.into())),
        }
    }

    /// Create the reservation. On success the form is cleared; on failure
    /// everything entered is kept.
    pub async fn submit(&mut self) -> Result<Reservation, GatewayError> {
        let candidate = self.candidate()?;
        let car_id = candidate.car_id;
        match self.gateway.create_reservation(candidate).await {
            Ok(reservation) => {
                tracing::info!(
                    "reservation {} booked on car {car_id} ({} to {})",
                    reservation.id,
                    reservation.range.from,
                    reservation.range.to
                );
                self.reset();
                Ok(reservation)
            }
            Err(e @ GatewayError::AvailabilityConflict { .. }) => {
                // Someone else booked first; refresh so the picker shows it.
                self.select_car_keep_range(car_id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn select_car_keep_range(&mut self, car_id: Ulid) {
        let range = self.range;
        self.select_car(car_id).await;
        self.range = range;
    }

    pub fn reset(&mut self) {
        self.car_id = None;
        self.range = None;
        self.snapshot.clear();
        self.customer_name.clear();
        self.customer_phone.clear();
        self.customer_email.clear();
    }
}
