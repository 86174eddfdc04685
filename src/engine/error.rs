use ulid::Ulid;

use crate::error::{GatewayError, ValidationError};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    Conflict { car_id: Ulid, reservation_id: Ulid },
    Validation(String),
    HasReservations(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { car_id, reservation_id } => write!(
                f,
                "car {car_id}: overlaps existing reservation {reservation_id}"
            ),
            EngineError::Validation(msg) => write!(f, "{msg}"),
            EngineError::HasReservations(id) => {
                write!(f, "cannot delete car {id}: has reservations")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e.0)
    }
}

impl From<EngineError> for GatewayError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(id) => GatewayError::NotFound(id),
            EngineError::Conflict { car_id, reservation_id } => GatewayError::AvailabilityConflict {
                car_id: Some(car_id),
                conflicting: Some(reservation_id),
            },
            EngineError::WalError(msg) => GatewayError::DataUnavailable(msg),
            other @ (EngineError::AlreadyExists(_)
            | EngineError::Validation(_)
            | EngineError::HasReservations(_)
            | EngineError::LimitExceeded(_)) => GatewayError::Validation(other.to_string()),
        }
    }
}
