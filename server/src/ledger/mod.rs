//! The reservation ledger: the only path that creates or cancels reservations, and so
//! the only writer of a showtime's `reserved` counter.
//!
//! A booking moves each requested seat from free to booked, a cancellation moves it
//! back. The store runs each operation as one unit of work; the ledger validates input
//! before storage is touched and bounds every call with a timeout. A timed-out call is
//! dropped, which rolls back whatever the store had started.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub mod error;
pub mod rules;

pub use error::LedgerError;
pub use rules::Access;

use crate::models::{Reservation, ReservationRequest};
use crate::seating::{self, SeatLayout};
use crate::store::Database;

#[derive(Clone)]
pub struct ReservationLedger {
    store: Arc<dyn Database>,
    layout: Arc<SeatLayout>,
    timeout: Duration,
}

impl ReservationLedger {
    pub fn new(store: Arc<dyn Database>, layout: SeatLayout, timeout: Duration) -> Self {
        Self {
            store,
            layout: Arc::new(layout),
            timeout,
        }
    }

    pub fn layout(&self) -> &SeatLayout {
        &self.layout
    }

    #[instrument(skip(self, request), fields(showtime_id = ?request.showtime_id, seats = request.seats.len()))]
    pub async fn book(&self, request: ReservationRequest, access: Access) -> Result<Reservation, LedgerError> {
        let booking = rules::validate_request(request)
            .and_then(|booking| rules::check_access(access, booking.user_id).map(|()| booking))
            .inspect_err(|err| {
                metrics::counter!("reservations_rejected_total", "reason" => rejection_reason(err)).increment(1);
            })?;

        match self.bounded(self.store.book(&booking, &self.layout)).await {
            Ok(reservation) => {
                metrics::counter!("reservations_booked_total").increment(1);
                metrics::counter!("seats_booked_total").increment(reservation.seats.len() as u64);
                info!(reservation_id = %reservation.id, user_id = %reservation.user_id, "Reservation booked");
                Ok(reservation)
            }
            Err(err) => {
                metrics::counter!("reservations_rejected_total", "reason" => rejection_reason(&err)).increment(1);
                if let LedgerError::SeatConflict { seats } = &err {
                    info!(?seats, "Booking rejected: seats taken");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, reservation_id: Uuid, access: Access) -> Result<Reservation, LedgerError> {
        if reservation_id.is_nil() {
            return Err(LedgerError::Validation("reservation id must not be nil".to_string()));
        }

        let reservation = self.bounded(self.store.cancel(reservation_id, access, Utc::now())).await?;
        metrics::counter!("reservations_cancelled_total").increment(1);
        info!(showtime_id = %reservation.showtime_id, seats = reservation.seats.len(), "Reservation cancelled");
        Ok(reservation)
    }

    /// Seats of the showtime nobody holds yet, in layout order.
    pub async fn available_seats(&self, showtime_id: Uuid) -> Result<Vec<String>, LedgerError> {
        let snapshot = self.bounded(self.store.seat_snapshot(showtime_id)).await?;
        Ok(seating::available_seats(
            &self.layout,
            snapshot.showtime.capacity,
            &snapshot.committed,
        ))
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T, LedgerError>>) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Ledger operation timed out");
                Err(LedgerError::Timeout(self.timeout))
            }
        }
    }
}

fn rejection_reason(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::Validation(_) => "validation",
        LedgerError::SeatConflict { .. } => "seat_conflict",
        LedgerError::NotFound { .. } => "not_found",
        LedgerError::NotOwner { .. } => "forbidden",
        LedgerError::PastShowtime { .. } => "past_showtime",
        LedgerError::Storage(_) | LedgerError::Timeout(_) | LedgerError::Inconsistent(_) => "storage",
    }
}
