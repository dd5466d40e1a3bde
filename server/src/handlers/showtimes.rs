use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::{body, parse_id};
use crate::models::ShowtimeInput;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, json, success};
use crate::AppState;

pub async fn list_showtimes(State(state): State<AppState>) -> Result<Response, AppError> {
    let showtimes = state.db.list_showtimes().await?;
    Ok(success(showtimes, "Showtimes retrieved").into_response())
}

pub async fn create_showtime(
    State(state): State<AppState>,
    payload: Result<Json<ShowtimeInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let input = body(payload)?;
    input.validate().map_err(AppError::ValidationError)?;

    let showtime = state.db.create_showtime(&input).await?;
    info!(showtime_id = %showtime.id, movie_id = %showtime.movie_id, "Showtime created");
    Ok(created(showtime, "Showtime created").into_response())
}

pub async fn update_showtime(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ShowtimeInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&id, "showtime")?;
    let input = body(payload)?;
    input.validate().map_err(AppError::ValidationError)?;

    let showtime = state.db.update_showtime(id, &input, state.ledger.layout()).await?;
    Ok(success(showtime, "Showtime updated").into_response())
}

pub async fn delete_showtime(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_id(&id, "showtime")?;
    state.db.delete_showtime(id).await?;
    info!(showtime_id = %id, "Showtime deleted");
    Ok(empty_success("Showtime deleted").into_response())
}

/// Free seat labels of a showtime, in layout order.
pub async fn available_seats(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_id(&id, "showtime")?;
    let seats = state.ledger.available_seats(id).await?;
    Ok(json(StatusCode::OK, seats))
}
