use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Seats already reserved: {}", seats.join(", "))]
    SeatConflict { seats: Vec<String> },

    #[error("Past showtime: {0}")]
    PastShowtime(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SeatConflict { .. } | AppError::PastShowtime(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SeatConflict { .. } => "SEAT_CONFLICT",
            AppError::PastShowtime(_) => "PAST_SHOWTIME",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::StorageFailure(_) => "STORAGE_FAILURE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PastShowtime(msg)
            | AppError::Conflict(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::SeatConflict { seats } => {
                warn!(code = self.code(), ?seats, "Request rejected");
            }
            AppError::StorageFailure(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => AppError::ValidationError(msg),
            LedgerError::SeatConflict { seats } => AppError::SeatConflict { seats },
            e @ LedgerError::NotFound { .. } => AppError::NotFound(e.to_string()),
            e @ LedgerError::NotOwner { .. } => AppError::Forbidden(e.to_string()),
            e @ LedgerError::PastShowtime { .. } => AppError::PastShowtime(e.to_string()),
            LedgerError::Storage(e) => AppError::DatabaseError(e),
            e @ (LedgerError::Timeout(_) | LedgerError::Inconsistent(_)) => AppError::StorageFailure(e.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            e @ StoreError::NotFound { .. } => AppError::NotFound(e.to_string()),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Invalid(msg) => AppError::ValidationError(msg),
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::InvalidCredentials => {
                AppError::AuthError(err.to_string())
            }
            AuthError::Forbidden { .. } => AppError::Forbidden(err.to_string()),
            AuthError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PastShowtime(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::SeatConflict { .. } => "One or more seats are already reserved".to_string(),
            AppError::DatabaseError(_) | AppError::StorageFailure(_) => "A storage error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        // Conflicting seats are the only detail a client can act on.
        let details = match &self {
            AppError::SeatConflict { seats } => Some(json!({ "seats": seats })),
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}
