use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }
}

/// Map unique and foreign-key violations to domain errors; everything else stays a
/// database error.
pub(crate) fn classify(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(conflict());
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::Invalid(format!(
                "referenced record does not exist ({})",
                db_err.constraint().unwrap_or("foreign key")
            ));
        }
    }
    StoreError::Database(err)
}
