use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Change feed for a team. Calendar views subscribe to one car or to the
/// whole team and refetch their snapshot when something arrives.
pub struct NotifyHub {
    per_car: DashMap<Ulid, broadcast::Sender<Event>>,
    team: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            per_car: DashMap::new(),
            team: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Events touching one car. Creates the channel if needed.
    pub fn subscribe(&self, car_id: Ulid) -> broadcast::Receiver<Event> {
        self.per_car
            .entry(car_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Every event in the team.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.team.subscribe()
    }

    /// No-op for channels nobody listens on.
    pub fn send(&self, car_id: Ulid, event: &Event) {
        if let Some(sender) = self.per_car.get(&car_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.team.send(event.clone());
    }

    /// Drop a deleted car's channel. Its subscribers see `Closed`.
    pub fn remove(&self, car_id: &Ulid) {
        self.per_car.remove(car_id);
    }
}
