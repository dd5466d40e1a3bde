use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{body, parse_id};
use crate::auth::{Identity, Role};
use crate::ledger::Access;
use crate::models::{ReservationRequest, User};
use crate::utils::error::AppError;
use crate::utils::response::{json, message, success};
use crate::AppState;

#[derive(Serialize)]
struct Booked {
    message: &'static str,
    reservation_id: Uuid,
}

async fn current_user(state: &AppState, identity: &Identity) -> Result<User, AppError> {
    state
        .db
        .find_user_by_username(&identity.username)
        .await?
        .ok_or_else(|| AppError::AuthError(format!("account '{}' no longer exists", identity.username)))
}

/// Admins act for any account; everyone else only for their own.
async fn caller_access(state: &AppState, identity: &Identity) -> Result<Access, AppError> {
    if identity.role == Role::Admin {
        return Ok(Access::Any);
    }
    Ok(Access::Own(current_user(state, identity).await?.id))
}

pub async fn reserve(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = body(payload)?;
    let access = caller_access(&state, &identity).await?;
    let reservation = state.ledger.book(request, access).await?;

    Ok(json(
        StatusCode::OK,
        Booked {
            message: "Reservation successful",
            reservation_id: reservation.id,
        },
    ))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id, "reservation")?;
    let access = caller_access(&state, &identity).await?;
    state.ledger.cancel(id, access).await?;
    Ok(message(StatusCode::OK, "Reservation cancelled successfully"))
}

/// Reservations of the account behind the bearer token.
pub async fn my_reservations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let user = current_user(&state, &identity).await?;
    let reservations = state.db.reservations_for_user(user.id).await?;
    Ok(success(reservations, "Reservations retrieved").into_response())
}

pub async fn all_reservations(State(state): State<AppState>) -> Result<Response, AppError> {
    let reservations = state.db.all_reservations().await?;
    Ok(success(reservations, "Reservations retrieved").into_response())
}

pub async fn reservations_for_movie(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_id(&id, "movie")?;
    let counts = state.db.reservation_counts_for_movie(id).await?;
    Ok(success(counts, "Reservation counts retrieved").into_response())
}
