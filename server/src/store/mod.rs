//! Persistence traits for the catalog, the schedule, accounts and reservations.
//!
//! Two implementations exist: [`PgStore`] for PostgreSQL and [`InMemoryStore`] for tests
//! and database-less local runs. Handlers and the ledger only see `Arc<dyn Database>`.
//!
//! Booking and cancellation are part of the store because each backend has to run the
//! ledger rules inside its own unit of work. Both backends serialize these operations per
//! showtime; different showtimes proceed in parallel.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ledger::{Access, LedgerError};
use crate::models::{
    Movie, MovieFilter, MovieInput, MovieReservationCount, MovieSeatTotal, NewReservation, NewUser,
    Reservation, Showtime, ShowtimeInput, User,
};
use crate::seating::SeatLayout;

pub mod error;
pub mod in_memory;
pub mod postgres;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

/// A showtime together with the seats committed to it, read at one point in time.
#[derive(Debug, Clone)]
pub struct SeatSnapshot {
    pub showtime: Showtime,
    pub committed: HashSet<String>,
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// # Errors
    /// - `Conflict` if another movie already has the title
    async fn create_movie(&self, input: &MovieInput) -> Result<Movie, StoreError>;

    /// Movies ordered by title. The genre filter is a case-insensitive substring match.
    async fn list_movies(&self, filter: &MovieFilter) -> Result<Vec<Movie>, StoreError>;

    async fn get_movie(&self, id: Uuid) -> Result<Movie, StoreError>;

    async fn update_movie(&self, id: Uuid, input: &MovieInput) -> Result<Movie, StoreError>;

    /// Deletes the movie with its showtimes and their reservations.
    async fn delete_movie(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ShowtimeStore: Send + Sync {
    /// # Errors
    /// - `NotFound` if the movie does not exist
    async fn create_showtime(&self, input: &ShowtimeInput) -> Result<Showtime, StoreError>;

    /// Showtimes ordered by start time.
    async fn list_showtimes(&self) -> Result<Vec<Showtime>, StoreError>;

    async fn get_showtime(&self, id: Uuid) -> Result<Showtime, StoreError>;

    /// Changes movie, start time and capacity. `reserved` is left alone.
    ///
    /// # Errors
    /// - `Invalid` if the new capacity would leave committed seats outside the layout,
    ///   or if the movie changes while reservations exist
    async fn update_showtime(
        &self,
        id: Uuid,
        input: &ShowtimeInput,
        layout: &SeatLayout,
    ) -> Result<Showtime, StoreError>;

    /// Deletes the showtime and its reservations.
    async fn delete_showtime(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Errors
    /// - `Conflict` if the username is taken
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Atomically check availability, insert the reservation and raise `reserved`.
    async fn book(&self, booking: &NewReservation, layout: &SeatLayout) -> Result<Reservation, LedgerError>;

    /// Atomically lower `reserved` and delete the reservation, provided `access` covers
    /// its owner and the showtime starts after `now`. Returns the deleted reservation.
    async fn cancel(&self, reservation_id: Uuid, access: Access, now: DateTime<Utc>) -> Result<Reservation, LedgerError>;

    async fn seat_snapshot(&self, showtime_id: Uuid) -> Result<SeatSnapshot, LedgerError>;

    /// Newest first.
    async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError>;

    /// Newest first.
    async fn all_reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn reservation_counts_for_movie(&self, movie_id: Uuid) -> Result<MovieReservationCount, StoreError>;

    /// Seats sold per movie, including movies with none, ordered by title.
    async fn seats_per_movie(&self) -> Result<Vec<MovieSeatTotal>, StoreError>;
}

/// Everything the server needs from a backend.
pub trait Database: MovieStore + ShowtimeStore + UserStore + ReservationStore {}

impl<T> Database for T where T: MovieStore + ShowtimeStore + UserStore + ReservationStore {}
