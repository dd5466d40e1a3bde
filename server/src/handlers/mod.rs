use axum::{extract::rejection::JsonRejection, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod auth;
pub mod movies;
pub mod reports;
pub mod reservations;
pub mod showtimes;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "cinema-api",
    };

    success(payload, "Health check successful").into_response()
}

/// Path ids are parsed by hand so that a malformed id is a 400 in the usual error shape.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::ValidationError(format!("'{raw}' is not a valid {what} id")))
}

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}
