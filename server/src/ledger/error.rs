use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("seats already reserved: {}", seats.join(", "))]
    SeatConflict { seats: Vec<String> },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("user '{caller}' may only act on their own reservations")]
    NotOwner { caller: Uuid },

    #[error("showtime started at {start_time}; it can no longer be changed")]
    PastShowtime { start_time: DateTime<Utc> },

    #[error("storage failure")]
    Storage(#[from] sqlx::Error),

    #[error("storage did not answer within {0:?}")]
    Timeout(Duration),

    /// Stored counters disagree with the committed seats.
    #[error("inconsistent seat accounting: {0}")]
    Inconsistent(String),
}

impl LedgerError {
    pub fn showtime_not_found(id: Uuid) -> Self {
        LedgerError::NotFound { entity: "showtime", id }
    }

    pub fn reservation_not_found(id: Uuid) -> Self {
        LedgerError::NotFound {
            entity: "reservation",
            id,
        }
    }
}
