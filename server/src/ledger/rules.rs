//! Pure checks shared by every store backend. Stores run these inside their unit of
//! work so that the decision and the write see the same state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::LedgerError;
use crate::models::{NewReservation, ReservationRequest, Showtime};
use crate::seating::{SeatLabel, SeatLayout};

/// Reject malformed bookings before any storage is touched.
pub fn validate_request(request: ReservationRequest) -> Result<NewReservation, LedgerError> {
    let user_id = required_id(request.user_id, "user_id")?;
    let showtime_id = required_id(request.showtime_id, "showtime_id")?;
    if request.movie_id.is_some_and(|id| id.is_nil()) {
        return Err(LedgerError::Validation("movie_id must not be nil".to_string()));
    }

    if request.seats.is_empty() {
        return Err(LedgerError::Validation("at least one seat is required".to_string()));
    }

    let mut seen = HashSet::with_capacity(request.seats.len());
    for seat in &request.seats {
        seat.parse::<SeatLabel>()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        if !seen.insert(seat.as_str()) {
            return Err(LedgerError::Validation(format!("seat '{seat}' is requested twice")));
        }
    }

    Ok(NewReservation {
        user_id,
        movie_id: request.movie_id,
        showtime_id,
        seats: request.seats,
    })
}

fn required_id(id: Option<Uuid>, field: &str) -> Result<Uuid, LedgerError> {
    match id {
        Some(id) if !id.is_nil() => Ok(id),
        _ => Err(LedgerError::Validation(format!("{field} is required"))),
    }
}

/// The movie a reservation is recorded against. An omitted movie means the showtime's.
pub fn resolve_movie(showtime: &Showtime, requested: Option<Uuid>) -> Result<Uuid, LedgerError> {
    match requested {
        None => Ok(showtime.movie_id),
        Some(id) if id == showtime.movie_id => Ok(id),
        Some(id) => Err(LedgerError::Validation(format!(
            "movie '{id}' is not playing at showtime '{}'",
            showtime.id
        ))),
    }
}

pub fn check_seats_exist(layout: &SeatLayout, showtime: &Showtime, seats: &[String]) -> Result<(), LedgerError> {
    let missing: Vec<&str> = seats
        .iter()
        .filter(|seat| !layout.contains(showtime.capacity, seat))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::Validation(format!(
            "seats do not exist for this showtime: {}",
            missing.join(", ")
        )))
    }
}

/// Requested seats that are already committed, in request order.
pub fn find_conflicts(requested: &[String], committed: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|seat| committed.contains(seat.as_str()))
        .cloned()
        .collect()
}

pub fn check_no_conflict(requested: &[String], committed: &HashSet<String>) -> Result<(), LedgerError> {
    let seats = find_conflicts(requested, committed);
    if seats.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::SeatConflict { seats })
    }
}

/// Whose reservations a caller may book or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Any,
    Own(Uuid),
}

pub fn check_access(access: Access, user_id: Uuid) -> Result<(), LedgerError> {
    match access {
        Access::Own(caller) if caller != user_id => Err(LedgerError::NotOwner { caller }),
        _ => Ok(()),
    }
}

/// Only showtimes that start strictly after `now` can be cancelled.
pub fn check_cancellable(showtime: &Showtime, now: DateTime<Utc>) -> Result<(), LedgerError> {
    if showtime.has_started(now) {
        Err(LedgerError::PastShowtime {
            start_time: showtime.start_time,
        })
    } else {
        Ok(())
    }
}

/// Committed seats that would fall outside the layout if capacity became `new_capacity`.
pub fn stranded_seats(layout: &SeatLayout, new_capacity: i32, committed: &HashSet<String>) -> Vec<String> {
    let mut stranded: Vec<String> = committed
        .iter()
        .filter(|seat| !layout.contains(new_capacity, seat))
        .cloned()
        .collect();
    stranded.sort_by_key(|seat| seat.parse::<SeatLabel>().ok().and_then(|s| layout.ordinal(&s)));
    stranded
}
