use chrono::Datelike;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    use crate::limits::*;
    if range.from > range.to {
        return Err(EngineError::Validation(format!(
            "invalid range: {} is after {}",
            range.from, range.to
        )));
    }
    if range.from.year() < MIN_VALID_YEAR || range.to.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if range.len_days() > MAX_RESERVATION_DAYS {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(())
}

pub(crate) fn validate_window(window: &DateRange) -> Result<(), EngineError> {
    if window.len_days() > crate::limits::MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// All customer fields present and bounded.
pub(crate) fn validate_customer(candidate: &NewReservation) -> Result<(), EngineError> {
    use crate::limits::MAX_CUSTOMER_FIELD_LEN;
    let fields = [
        &candidate.customer_name,
        &candidate.customer_phone,
        &candidate.customer_email,
    ];
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(EngineError::Validation("Please fill in all fields".into()));
    }
    if fields.iter().any(|f| f.len() > MAX_CUSTOMER_FIELD_LEN) {
        return Err(EngineError::LimitExceeded("customer field too long"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("car name is required".into()));
    }
    if name.len() > crate::limits::MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("car name too long"));
    }
    Ok(())
}

/// Authoritative check under the car's write lock: any reservation sharing a
/// day with `range` is a conflict.
pub(crate) fn check_no_conflict(cs: &CarState, range: &DateRange) -> Result<(), EngineError> {
    match cs.overlapping(range).next() {
        Some(existing) => Err(EngineError::Conflict {
            car_id: cs.id,
            reservation_id: existing.id,
        }),
        None => Ok(()),
    }
}

/// Local calendar day.
pub(crate) fn today() -> Day {
    chrono::Local::now().date_naive()
}
