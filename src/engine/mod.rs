mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

pub(crate) use conflict::today;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCarState = Arc<RwLock<CarState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// committed together with one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so stale bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// One team's cars and reservations.
pub struct Engine {
    pub state: DashMap<Ulid, SharedCarState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → car id
    pub(super) reservation_to_car: DashMap<Ulid, Ulid>,
    /// Held while the set of cars changes and while compaction snapshots it.
    pub(super) catalog: Mutex<()>,
}

/// Apply a reservation or car-update event to a car (caller holds the lock).
fn apply_to_car(cs: &mut CarState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::CarUpdated {
            name,
            number_plate,
            mileage,
            status,
            ..
        } => {
            cs.name = name.clone();
            cs.number_plate = number_plate.clone();
            cs.mileage = *mileage;
            cs.status = *status;
        }
        Event::ReservationCreated { reservation } => {
            index.insert(reservation.id, reservation.car_id);
            cs.insert_reservation(reservation.clone());
        }
        Event::ReservationDeleted { id, .. } => {
            cs.remove_reservation(*id);
            index.remove(id);
        }
        // Car creation/deletion is handled at the DashMap level.
        Event::CarCreated { .. } | Event::CarDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            reservation_to_car: DashMap::new(),
            catalog: Mutex::new(()),
        };

        // Sole owner of every Arc during replay, so try_write never contends.
        // blocking_write would panic here when called from inside a runtime.
        for event in &events {
            match event {
                Event::CarCreated {
                    id,
                    name,
                    number_plate,
                    mileage,
                    status,
                } => {
                    let cs = CarState::new(*id, name.clone(), number_plate.clone(), *mileage, *status);
                    engine.state.insert(*id, Arc::new(RwLock::new(cs)));
                }
                Event::CarDeleted { id } => {
                    engine.state.remove(id);
                    engine.reservation_to_car.retain(|_, car| *car != *id);
                }
                other => {
                    let Some(entry) = engine.state.get(&other.car_id()) else {
                        tracing::warn!("replay: event for unknown car {}", other.car_id());
                        continue;
                    };
                    let cs = entry.value().clone();
                    drop(entry);
                    let mut guard = cs
                        .try_write()
                        .map_err(|_| io::Error::other("replay: car state contended"))?;
                    apply_to_car(&mut guard, other, &engine.reservation_to_car);
                }
            }
        }

        tracing::debug!(
            "engine replayed {} events, {} cars",
            events.len(),
            engine.state.len()
        );
        Ok(engine)
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_car(&self, id: &Ulid) -> Option<SharedCarState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_car_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_car.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append, apply, notify.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CarState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_car(cs, event, &self.reservation_to_car);
        self.notify.send(cs.id, event);
        Ok(())
    }

    /// The car's write lock. A car deleted while we waited is `NotFound`:
    /// its state is no longer the one in `self.state`.
    pub(super) async fn lock_car(
        &self,
        car_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CarState>, EngineError> {
        let cs = self.get_car(&car_id).ok_or(EngineError::NotFound(car_id))?;
        let guard = cs.clone().write_owned().await;
        let live = self
            .state
            .get(&car_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), &cs));
        if !live {
            return Err(EngineError::NotFound(car_id));
        }
        Ok(guard)
    }

    /// Reservation → car lookup, then the car's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CarState>, EngineError> {
        let car_id = self
            .get_car_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        self.lock_car(car_id)
            .await
            .map_err(|_| EngineError::NotFound(*reservation_id))
    }
}
