use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::{body, parse_id};
use crate::models::{MovieFilter, MovieInput};
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::AppState;

pub async fn list_movies(State(state): State<AppState>, Query(filter): Query<MovieFilter>) -> Result<Response, AppError> {
    let movies = state.db.list_movies(&filter).await?;
    Ok(success(movies, "Movies retrieved").into_response())
}

pub async fn create_movie(
    State(state): State<AppState>,
    payload: Result<Json<MovieInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let input = body(payload)?;
    input.validate().map_err(AppError::ValidationError)?;

    let movie = state.db.create_movie(&input).await?;
    info!(movie_id = %movie.id, title = %movie.title, "Movie created");
    Ok(created(movie, "Movie created").into_response())
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<MovieInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&id, "movie")?;
    let input = body(payload)?;
    input.validate().map_err(AppError::ValidationError)?;

    let movie = state.db.update_movie(id, &input).await?;
    Ok(success(movie, "Movie updated").into_response())
}

pub async fn delete_movie(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_id(&id, "movie")?;
    state.db.delete_movie(id).await?;
    info!(movie_id = %id, "Movie deleted");
    Ok(empty_success("Movie deleted").into_response())
}
