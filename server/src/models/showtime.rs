use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled screening. `reserved` is maintained by the reservation ledger only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
    pub reserved: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Showtime {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }
}

/// Body of the create and update showtime endpoints. Carries no `reserved` field;
/// only the ledger changes it.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowtimeInput {
    pub movie_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
}

impl ShowtimeInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity < 0 {
            return Err("Showtime capacity must not be negative".to_string());
        }
        Ok(())
    }
}
