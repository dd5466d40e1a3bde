//! PostgreSQL backend.
//!
//! Book and cancel lock the showtime row first (`SELECT ... FOR UPDATE`) and only then
//! touch reservation rows, so operations on one showtime queue behind each other while
//! different showtimes run in parallel. `reserved_seats` has one row per committed seat
//! with `(showtime_id, seat_label)` as primary key; it backs the locking with a
//! constraint that makes double booking impossible even for writers that skip the lock.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::classify;
use super::{MovieStore, ReservationStore, SeatSnapshot, ShowtimeStore, StoreError, UserStore};
use crate::auth::Role;
use crate::ledger::{rules, Access, LedgerError};
use crate::models::{
    Movie, MovieFilter, MovieInput, MovieReservationCount, MovieSeatTotal, NewReservation, NewUser,
    Reservation, Showtime, ShowtimeInput, User,
};
use crate::seating::SeatLayout;

const MOVIE_COLUMNS: &str = "id, title, description, genre, poster_image, created_at, updated_at";
const SHOWTIME_COLUMNS: &str = "id, movie_id, start_time, capacity, reserved, created_at, updated_at";
const RESERVATION_COLUMNS: &str = "id, user_id, movie_id, showtime_id, seats, created_at";
const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Invalid(format!("user '{}': {e}", row.username)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn duplicate_title(title: &str) -> impl FnOnce() -> String + '_ {
    move || format!("a movie titled '{title}' already exists")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

async fn lock_showtime(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Option<Showtime>, sqlx::Error> {
    sqlx::query_as::<_, Showtime>(&format!(
        "SELECT {SHOWTIME_COLUMNS} FROM showtimes WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

async fn committed_in_tx(tx: &mut Transaction<'_, Postgres>, showtime_id: Uuid) -> Result<HashSet<String>, sqlx::Error> {
    let seats: Vec<String> = sqlx::query_scalar("SELECT seat_label FROM reserved_seats WHERE showtime_id = $1")
        .bind(showtime_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(seats.into_iter().collect())
}

#[async_trait]
impl MovieStore for PgStore {
    async fn create_movie(&self, input: &MovieInput) -> Result<Movie, StoreError> {
        sqlx::query_as::<_, Movie>(&format!(
            "INSERT INTO movies (id, title, description, genre, poster_image)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.genre)
        .bind(&input.poster_image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, duplicate_title(&input.title)))
    }

    async fn list_movies(&self, filter: &MovieFilter) -> Result<Vec<Movie>, StoreError> {
        let movies = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies
             WHERE $1::text IS NULL OR strpos(lower(genre), lower($1)) > 0
             ORDER BY title"
        ))
        .bind(filter.genre.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(movies)
    }

    async fn get_movie(&self, id: Uuid) -> Result<Movie, StoreError> {
        sqlx::query_as::<_, Movie>(&format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("movie", id))
    }

    async fn update_movie(&self, id: Uuid, input: &MovieInput) -> Result<Movie, StoreError> {
        sqlx::query_as::<_, Movie>(&format!(
            "UPDATE movies
             SET title = $2, description = $3, genre = $4, poster_image = $5, updated_at = NOW()
             WHERE id = $1
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.genre)
        .bind(&input.poster_image)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, duplicate_title(&input.title)))?
        .ok_or_else(|| StoreError::not_found("movie", id))
    }

    async fn delete_movie(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("movie", id));
        }
        Ok(())
    }
}

#[async_trait]
impl ShowtimeStore for PgStore {
    async fn create_showtime(&self, input: &ShowtimeInput) -> Result<Showtime, StoreError> {
        sqlx::query_as::<_, Showtime>(&format!(
            "INSERT INTO showtimes (id, movie_id, start_time, capacity, reserved)
             VALUES ($1, $2, $3, $4, 0)
             RETURNING {SHOWTIME_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.movie_id)
        .bind(input.start_time)
        .bind(input.capacity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("movie", input.movie_id)
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn list_showtimes(&self) -> Result<Vec<Showtime>, StoreError> {
        let showtimes = sqlx::query_as::<_, Showtime>(&format!(
            "SELECT {SHOWTIME_COLUMNS} FROM showtimes ORDER BY start_time, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(showtimes)
    }

    async fn get_showtime(&self, id: Uuid) -> Result<Showtime, StoreError> {
        sqlx::query_as::<_, Showtime>(&format!("SELECT {SHOWTIME_COLUMNS} FROM showtimes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("showtime", id))
    }

    #[instrument(skip(self, input, layout), err)]
    async fn update_showtime(
        &self,
        id: Uuid,
        input: &ShowtimeInput,
        layout: &SeatLayout,
    ) -> Result<Showtime, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_showtime(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("showtime", id))?;
        let committed = committed_in_tx(&mut tx, id).await?;

        if input.movie_id != current.movie_id && !committed.is_empty() {
            return Err(StoreError::Invalid(
                "cannot move a showtime with reservations to another movie".to_string(),
            ));
        }

        let stranded = rules::stranded_seats(layout, input.capacity, &committed);
        if !stranded.is_empty() {
            return Err(StoreError::Invalid(format!(
                "capacity {} would drop reserved seats: {}",
                input.capacity,
                stranded.join(", ")
            )));
        }

        let updated = sqlx::query_as::<_, Showtime>(&format!(
            "UPDATE showtimes
             SET movie_id = $2, start_time = $3, capacity = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING {SHOWTIME_COLUMNS}"
        ))
        .bind(id)
        .bind(input.movie_id)
        .bind(input.start_time)
        .bind(input.capacity)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("movie", input.movie_id)
            } else {
                StoreError::Database(e)
            }
        })?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM showtimes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("showtime", id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("username '{}' is already taken", user.username)))?;
        row.try_into()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    #[instrument(skip(self, booking, layout), fields(showtime_id = %booking.showtime_id, seats = booking.seats.len()), err)]
    async fn book(&self, booking: &NewReservation, layout: &SeatLayout) -> Result<Reservation, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let showtime = lock_showtime(&mut tx, booking.showtime_id)
            .await?
            .ok_or_else(|| LedgerError::showtime_not_found(booking.showtime_id))?;

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(booking.user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !user_exists {
            return Err(LedgerError::NotFound {
                entity: "user",
                id: booking.user_id,
            });
        }

        let movie_id = rules::resolve_movie(&showtime, booking.movie_id)?;
        rules::check_seats_exist(layout, &showtime, &booking.seats)?;

        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT seat
             FROM reservations r CROSS JOIN LATERAL unnest(r.seats) AS seat
             WHERE r.showtime_id = $1 AND r.seats && $2 AND seat = ANY($2)",
        )
        .bind(showtime.id)
        .bind(booking.seats.as_slice())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();
        rules::check_no_conflict(&booking.seats, &taken)?;

        let added = i32::try_from(booking.seats.len())
            .map_err(|_| LedgerError::Validation("too many seats requested".to_string()))?;

        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "INSERT INTO reservations (id, user_id, movie_id, showtime_id, seats)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(booking.user_id)
        .bind(movie_id)
        .bind(showtime.id)
        .bind(booking.seats.as_slice())
        .fetch_one(&mut *tx)
        .await?;

        // Seats another writer committed without going through the showtime lock come back
        // missing from RETURNING; dropping `tx` on the error path rolls the reservation back.
        let claimed: HashSet<String> = sqlx::query_scalar::<_, String>(
            "INSERT INTO reserved_seats (showtime_id, seat_label, reservation_id)
             SELECT $1, seat, $3 FROM unnest($2::text[]) AS seat
             ON CONFLICT (showtime_id, seat_label) DO NOTHING
             RETURNING seat_label",
        )
        .bind(showtime.id)
        .bind(booking.seats.as_slice())
        .bind(reservation.id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();
        let lost: HashSet<String> = booking
            .seats
            .iter()
            .filter(|seat| !claimed.contains(seat.as_str()))
            .cloned()
            .collect();
        rules::check_no_conflict(&booking.seats, &lost)?;

        sqlx::query("UPDATE showtimes SET reserved = reserved + $2, updated_at = NOW() WHERE id = $1")
            .bind(showtime.id)
            .bind(added)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(reservation_id = %reservation.id, "Seats booked");
        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    async fn cancel(&self, reservation_id: Uuid, access: Access, now: DateTime<Utc>) -> Result<Reservation, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let showtime_id: Uuid = sqlx::query_scalar("SELECT showtime_id FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;

        // Showtime before reservation, the same order book uses.
        let showtime = lock_showtime(&mut tx, showtime_id)
            .await?
            .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;

        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 AND showtime_id = $2 FOR UPDATE"
        ))
        .bind(reservation_id)
        .bind(showtime_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;

        rules::check_access(access, reservation.user_id)?;
        rules::check_cancellable(&showtime, now)?;

        let released = i32::try_from(reservation.seats.len()).unwrap_or(i32::MAX);
        sqlx::query("UPDATE showtimes SET reserved = reserved - $2, updated_at = NOW() WHERE id = $1")
            .bind(showtime_id)
            .bind(released)
            .execute(&mut *tx)
            .await?;

        // reserved_seats rows go with it through ON DELETE CASCADE.
        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(showtime_id = %showtime_id, "Reservation cancelled");
        Ok(reservation)
    }

    async fn seat_snapshot(&self, showtime_id: Uuid) -> Result<SeatSnapshot, LedgerError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let showtime = sqlx::query_as::<_, Showtime>(&format!(
            "SELECT {SHOWTIME_COLUMNS} FROM showtimes WHERE id = $1"
        ))
        .bind(showtime_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::showtime_not_found(showtime_id))?;
        let committed = committed_in_tx(&mut tx, showtime_id).await?;

        tx.commit().await?;
        Ok(SeatSnapshot { showtime, committed })
    }

    async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    async fn all_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    async fn reservation_counts_for_movie(&self, movie_id: Uuid) -> Result<MovieReservationCount, StoreError> {
        sqlx::query_as::<_, MovieReservationCount>(
            "SELECT m.id AS movie_id,
                    m.title AS movie_title,
                    COUNT(r.id) AS reservation_count,
                    COALESCE(SUM(cardinality(r.seats)), 0)::BIGINT AS seat_count
             FROM movies m
             LEFT JOIN reservations r ON r.movie_id = m.id
             WHERE m.id = $1
             GROUP BY m.id, m.title",
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("movie", movie_id))
    }

    async fn seats_per_movie(&self) -> Result<Vec<MovieSeatTotal>, StoreError> {
        let totals = sqlx::query_as::<_, MovieSeatTotal>(
            "SELECT m.title,
                    COALESCE(SUM(cardinality(r.seats)), 0)::BIGINT AS seats_reserved
             FROM movies m
             LEFT JOIN reservations r ON r.movie_id = m.id
             GROUP BY m.id, m.title
             ORDER BY m.title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(totals)
    }
}
