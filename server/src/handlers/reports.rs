use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::models::RevenueReport;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::AppState;

/// Seats sold per movie at the configured flat ticket price.
pub async fn revenue(State(state): State<AppState>) -> Result<Response, AppError> {
    let totals = state.db.seats_per_movie().await?;
    let report = RevenueReport::from_totals(&totals, state.config.ticket_price);
    Ok(success(report, "Revenue report").into_response())
}
