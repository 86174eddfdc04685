use std::collections::{BTreeSet, HashMap};

use ulid::Ulid;

use crate::calendar::{self, DailyCount, MonthGrid, Timeline};
use crate::model::*;

use super::conflict::validate_window;
use super::{Engine, EngineError};

impl Engine {
    /// Cars ordered by name, then id.
    pub async fn list_cars(&self) -> Vec<Car> {
        let cars: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(cars.len());
        for cs in cars {
            out.push(cs.read().await.info());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn car_summary(&self) -> CarSummary {
        let cars = self.list_cars().await;
        CarSummary {
            total: cars.len(),
            available: cars
                .iter()
                .filter(|c| c.status == CarStatus::Available)
                .count(),
        }
    }

    /// Reservations in `scope` that share at least one day with `window`
    /// (all of them without a window), ordered by start day then id.
    /// An unknown car yields an empty list.
    pub async fn get_reservations(
        &self,
        scope: CarScope,
        window: Option<DateRange>,
    ) -> Result<Vec<Reservation>, EngineError> {
        if let Some(w) = &window {
            validate_window(w)?;
        }
        let cars: Vec<_> = match scope {
            CarScope::All => self.state.iter().map(|e| e.value().clone()).collect(),
            CarScope::Car(id) => self.get_car(&id).into_iter().collect(),
        };

        let mut out = Vec::new();
        for cs in cars {
            let guard = cs.read().await;
            match &window {
                Some(w) => out.extend(guard.overlapping(w).cloned()),
                None => out.extend(guard.reservations.iter().cloned()),
            }
        }
        out.sort_by(|a, b| a.range.from.cmp(&b.range.from).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Car id → display name, for timeline grouping.
    pub async fn car_lookup(&self) -> HashMap<Ulid, String> {
        self.list_cars()
            .await
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect()
    }

    /// Month grid for the month containing `anchor`, over every car.
    pub async fn month_grid(&self, anchor: Day) -> Result<MonthGrid, EngineError> {
        let (start, end) = calendar::month_bounds(anchor);
        let reservations = self
            .get_reservations(CarScope::All, Some(DateRange { from: start, to: end }))
            .await?;
        Ok(calendar::build_month_grid(anchor, &reservations))
    }

    pub async fn timeline(&self, anchor: Day, today: Day) -> Result<Timeline, EngineError> {
        let (start, end) = calendar::month_bounds(anchor);
        let reservations = self
            .get_reservations(CarScope::All, Some(DateRange { from: start, to: end }))
            .await?;
        let lookup = self.car_lookup().await;
        Ok(calendar::build_timeline(anchor, &reservations, &lookup, today))
    }

    /// Days a new booking on `car_id` may not touch. Unknown car: none.
    pub async fn disabled_days(&self, car_id: Ulid) -> BTreeSet<Day> {
        match self.get_car(&car_id) {
            Some(cs) => calendar::disabled_days(&cs.read().await.reservations),
            None => BTreeSet::new(),
        }
    }

    pub async fn daily_occupancy(&self, window: DateRange) -> Result<Vec<DailyCount>, EngineError> {
        let reservations = self.get_reservations(CarScope::All, Some(window)).await?;
        Ok(calendar::daily_occupancy(&window, &reservations))
    }
}
