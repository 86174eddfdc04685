use ulid::Ulid;

/// User-facing message for any rejected candidate range.
pub const OVERLAP_MESSAGE: &str = "the selected period overlaps an existing reservation";

/// A missing field or an inverted range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation error: {}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Errors crossing the gateway boundary. Each variant renders as a single
/// message suitable for showing to the person making the booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    Validation(String),
    /// `conflicting` is known when the store reports which reservation blocked the range.
    AvailabilityConflict {
        car_id: Option<Ulid>,
        conflicting: Option<Ulid>,
    },
    DataUnavailable(String),
    NotFound(Ulid),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Validation(msg) => write!(f, "{msg}"),
            GatewayError::AvailabilityConflict { .. } => write!(f, "{OVERLAP_MESSAGE}"),
            GatewayError::DataUnavailable(msg) => write!(f, "data unavailable: {msg}"),
            GatewayError::NotFound(id) => write!(f, "not found: {id}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        GatewayError::Validation(e.0)
    }
}
