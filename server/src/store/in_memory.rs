//! In-memory backend.
//!
//! Everything lives in process memory and is lost on restart. Each showtime sits behind
//! its own async mutex together with its reservations, so a booking or cancellation holds
//! exactly one lock for its whole check-and-act sequence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::{
    MovieStore, ReservationStore, SeatSnapshot, ShowtimeStore, StoreError, UserStore,
};
use crate::ledger::{rules, Access, LedgerError};
use crate::models::{
    Movie, MovieFilter, MovieInput, MovieReservationCount, MovieSeatTotal, NewReservation, NewUser,
    Reservation, Showtime, ShowtimeInput, User,
};
use crate::seating::{committed_seats, SeatLayout};

struct ShowtimeSlot {
    showtime: Showtime,
    reservations: Vec<Reservation>,
    /// Set when the showtime is deleted while another task still holds the slot.
    removed: bool,
}

impl ShowtimeSlot {
    fn committed(&self) -> std::collections::HashSet<String> {
        committed_seats(self.reservations.iter().map(|r| r.seats.as_slice()))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<String, User>>,
    movies: RwLock<HashMap<Uuid, Movie>>,
    showtimes: DashMap<Uuid, Arc<Mutex<ShowtimeSlot>>>,
    /// reservation id -> showtime id
    reservation_index: DashMap<Uuid, Uuid>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, showtime_id: Uuid) -> Option<Arc<Mutex<ShowtimeSlot>>> {
        self.showtimes.get(&showtime_id).map(|entry| Arc::clone(entry.value()))
    }

    fn all_slots(&self) -> Vec<Arc<Mutex<ShowtimeSlot>>> {
        self.showtimes.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    async fn all_reservations_where(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut found = Vec::new();
        for slot in self.all_slots() {
            let slot = slot.lock().await;
            if slot.removed {
                continue;
            }
            found.extend(slot.reservations.iter().filter(|r| keep(r)).cloned());
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    fn user_exists(&self, user_id: Uuid) -> bool {
        self.users.read().values().any(|u| u.id == user_id)
    }

    fn title_taken(movies: &HashMap<Uuid, Movie>, title: &str, except: Option<Uuid>) -> bool {
        movies
            .values()
            .any(|m| m.title == title && Some(m.id) != except)
    }

    /// Drop a showtime and the index entries of its reservations. The caller holds the slot.
    fn retire(&self, slot: &mut ShowtimeSlot) {
        self.showtimes.remove(&slot.showtime.id);
        for reservation in slot.reservations.drain(..) {
            self.reservation_index.remove(&reservation.id);
        }
        slot.removed = true;
    }
}

fn duplicate_title(title: &str) -> StoreError {
    StoreError::Conflict(format!("a movie titled '{title}' already exists"))
}

#[async_trait]
impl MovieStore for InMemoryStore {
    async fn create_movie(&self, input: &MovieInput) -> Result<Movie, StoreError> {
        let mut movies = self.movies.write();
        if Self::title_taken(&movies, &input.title, None) {
            return Err(duplicate_title(&input.title));
        }

        let now = Utc::now();
        let movie = Movie {
            id: Uuid::new_v4(),
            title: input.title.clone(),
            description: input.description.clone(),
            genre: input.genre.clone(),
            poster_image: input.poster_image.clone(),
            created_at: now,
            updated_at: now,
        };
        movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn list_movies(&self, filter: &MovieFilter) -> Result<Vec<Movie>, StoreError> {
        let needle = filter.genre.as_deref().map(str::to_lowercase);
        let mut movies: Vec<Movie> = self
            .movies
            .read()
            .values()
            .filter(|m| needle.as_deref().map_or(true, |g| m.genre.to_lowercase().contains(g)))
            .cloned()
            .collect();
        movies.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(movies)
    }

    async fn get_movie(&self, id: Uuid) -> Result<Movie, StoreError> {
        self.movies
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("movie", id))
    }

    async fn update_movie(&self, id: Uuid, input: &MovieInput) -> Result<Movie, StoreError> {
        let mut movies = self.movies.write();
        if !movies.contains_key(&id) {
            return Err(StoreError::not_found("movie", id));
        }
        if Self::title_taken(&movies, &input.title, Some(id)) {
            return Err(duplicate_title(&input.title));
        }

        let movie = movies
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("movie", id))?;
        movie.title = input.title.clone();
        movie.description = input.description.clone();
        movie.genre = input.genre.clone();
        movie.poster_image = input.poster_image.clone();
        movie.updated_at = Utc::now();
        Ok(movie.clone())
    }

    async fn delete_movie(&self, id: Uuid) -> Result<(), StoreError> {
        if self.movies.write().remove(&id).is_none() {
            return Err(StoreError::not_found("movie", id));
        }

        for slot in self.all_slots() {
            let mut slot = slot.lock().await;
            if !slot.removed && slot.showtime.movie_id == id {
                self.retire(&mut slot);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ShowtimeStore for InMemoryStore {
    async fn create_showtime(&self, input: &ShowtimeInput) -> Result<Showtime, StoreError> {
        // Held until the slot is inserted so a concurrent movie delete sweeps it.
        let movies = self.movies.read();
        if !movies.contains_key(&input.movie_id) {
            return Err(StoreError::not_found("movie", input.movie_id));
        }

        let now = Utc::now();
        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: input.movie_id,
            start_time: input.start_time,
            capacity: input.capacity,
            reserved: 0,
            created_at: now,
            updated_at: now,
        };
        self.showtimes.insert(
            showtime.id,
            Arc::new(Mutex::new(ShowtimeSlot {
                showtime: showtime.clone(),
                reservations: Vec::new(),
                removed: false,
            })),
        );
        drop(movies);
        Ok(showtime)
    }

    async fn list_showtimes(&self) -> Result<Vec<Showtime>, StoreError> {
        let mut showtimes = Vec::new();
        for slot in self.all_slots() {
            let slot = slot.lock().await;
            if !slot.removed {
                showtimes.push(slot.showtime.clone());
            }
        }
        showtimes.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(showtimes)
    }

    async fn get_showtime(&self, id: Uuid) -> Result<Showtime, StoreError> {
        let slot = self.slot(id).ok_or_else(|| StoreError::not_found("showtime", id))?;
        let slot = slot.lock().await;
        if slot.removed {
            return Err(StoreError::not_found("showtime", id));
        }
        Ok(slot.showtime.clone())
    }

    async fn update_showtime(
        &self,
        id: Uuid,
        input: &ShowtimeInput,
        layout: &SeatLayout,
    ) -> Result<Showtime, StoreError> {
        let slot = self.slot(id).ok_or_else(|| StoreError::not_found("showtime", id))?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(StoreError::not_found("showtime", id));
        }

        if input.movie_id != slot.showtime.movie_id {
            if !slot.reservations.is_empty() {
                return Err(StoreError::Invalid(
                    "cannot move a showtime with reservations to another movie".to_string(),
                ));
            }
            if !self.movies.read().contains_key(&input.movie_id) {
                return Err(StoreError::not_found("movie", input.movie_id));
            }
        }

        let stranded = rules::stranded_seats(layout, input.capacity, &slot.committed());
        if !stranded.is_empty() {
            return Err(StoreError::Invalid(format!(
                "capacity {} would drop reserved seats: {}",
                input.capacity,
                stranded.join(", ")
            )));
        }

        slot.showtime.movie_id = input.movie_id;
        slot.showtime.start_time = input.start_time;
        slot.showtime.capacity = input.capacity;
        slot.showtime.updated_at = Utc::now();
        Ok(slot.showtime.clone())
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<(), StoreError> {
        let slot = self.slot(id).ok_or_else(|| StoreError::not_found("showtime", id))?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(StoreError::not_found("showtime", id));
        }
        self.retire(&mut slot);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write();
        if users.contains_key(&user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.username.clone(), created.clone());
        Ok(created)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(username).cloned())
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    #[instrument(skip(self, booking, layout), fields(showtime_id = %booking.showtime_id, seats = booking.seats.len()))]
    async fn book(&self, booking: &NewReservation, layout: &SeatLayout) -> Result<Reservation, LedgerError> {
        let slot = self
            .slot(booking.showtime_id)
            .ok_or_else(|| LedgerError::showtime_not_found(booking.showtime_id))?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(LedgerError::showtime_not_found(booking.showtime_id));
        }
        if !self.user_exists(booking.user_id) {
            return Err(LedgerError::NotFound {
                entity: "user",
                id: booking.user_id,
            });
        }

        let movie_id = rules::resolve_movie(&slot.showtime, booking.movie_id)?;
        rules::check_seats_exist(layout, &slot.showtime, &booking.seats)?;
        rules::check_no_conflict(&booking.seats, &slot.committed())?;

        let added = i32::try_from(booking.seats.len())
            .map_err(|_| LedgerError::Validation("too many seats requested".to_string()))?;
        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            movie_id,
            showtime_id: booking.showtime_id,
            seats: booking.seats.clone(),
            created_at: Utc::now(),
        };

        slot.showtime.reserved += added;
        slot.reservations.push(reservation.clone());
        self.reservation_index.insert(reservation.id, booking.showtime_id);

        debug!(reservation_id = %reservation.id, reserved = slot.showtime.reserved, "Seats booked");
        Ok(reservation)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, reservation_id: Uuid, access: Access, now: DateTime<Utc>) -> Result<Reservation, LedgerError> {
        let showtime_id = self
            .reservation_index
            .get(&reservation_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;
        let slot = self
            .slot(showtime_id)
            .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;
        let mut slot = slot.lock().await;

        // Re-checked under the lock: a concurrent cancel or delete may have won.
        let position = slot
            .reservations
            .iter()
            .position(|r| r.id == reservation_id)
            .ok_or_else(|| LedgerError::reservation_not_found(reservation_id))?;
        rules::check_access(access, slot.reservations[position].user_id)?;
        rules::check_cancellable(&slot.showtime, now)?;

        let released = i32::try_from(slot.reservations[position].seats.len()).unwrap_or(i32::MAX);
        let remaining = slot.showtime.reserved - released;
        if remaining < 0 {
            error!(
                showtime_id = %showtime_id,
                reserved = slot.showtime.reserved,
                released,
                "Reserved counter would go negative"
            );
            return Err(LedgerError::Inconsistent(format!(
                "showtime {showtime_id} has {} reserved seats, cannot release {released}",
                slot.showtime.reserved
            )));
        }

        let reservation = slot.reservations.remove(position);
        slot.showtime.reserved = remaining;
        self.reservation_index.remove(&reservation_id);

        debug!(showtime_id = %showtime_id, reserved = slot.showtime.reserved, "Reservation cancelled");
        Ok(reservation)
    }

    async fn seat_snapshot(&self, showtime_id: Uuid) -> Result<SeatSnapshot, LedgerError> {
        let slot = self
            .slot(showtime_id)
            .ok_or_else(|| LedgerError::showtime_not_found(showtime_id))?;
        let slot = slot.lock().await;
        if slot.removed {
            return Err(LedgerError::showtime_not_found(showtime_id));
        }
        Ok(SeatSnapshot {
            showtime: slot.showtime.clone(),
            committed: slot.committed(),
        })
    }

    async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.all_reservations_where(|r| r.user_id == user_id).await)
    }

    async fn all_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.all_reservations_where(|_| true).await)
    }

    async fn reservation_counts_for_movie(&self, movie_id: Uuid) -> Result<MovieReservationCount, StoreError> {
        let movie_title = self
            .movies
            .read()
            .get(&movie_id)
            .map(|m| m.title.clone())
            .ok_or_else(|| StoreError::not_found("movie", movie_id))?;

        let reservations = self.all_reservations_where(|r| r.movie_id == movie_id).await;
        Ok(MovieReservationCount {
            movie_id,
            movie_title,
            reservation_count: reservations.len() as i64,
            seat_count: reservations.iter().map(|r| r.seats.len() as i64).sum(),
        })
    }

    async fn seats_per_movie(&self) -> Result<Vec<MovieSeatTotal>, StoreError> {
        let reservations = self.all_reservations_where(|_| true).await;
        let mut seats_by_movie: HashMap<Uuid, i64> = HashMap::new();
        for reservation in &reservations {
            *seats_by_movie.entry(reservation.movie_id).or_default() += reservation.seats.len() as i64;
        }

        let mut totals: Vec<MovieSeatTotal> = self
            .movies
            .read()
            .values()
            .map(|m| MovieSeatTotal {
                title: m.title.clone(),
                seats_reserved: seats_by_movie.get(&m.id).copied().unwrap_or(0),
            })
            .collect();
        totals.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::Duration;

    async fn movie(store: &InMemoryStore, title: &str, genre: &str) -> Movie {
        store
            .create_movie(&MovieInput {
                title: title.to_string(),
                description: String::new(),
                genre: genre.to_string(),
                poster_image: String::new(),
            })
            .await
            .unwrap()
    }

    async fn showtime(store: &InMemoryStore, movie_id: Uuid, capacity: i32) -> Showtime {
        store
            .create_showtime(&ShowtimeInput {
                movie_id,
                start_time: Utc::now() + Duration::hours(3),
                capacity,
            })
            .await
            .unwrap()
    }

    async fn user(store: &InMemoryStore, username: &str) -> User {
        store
            .create_user(&NewUser {
                username: username.to_string(),
                password_hash: "hash".to_string(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    fn booking(user: &User, showtime: &Showtime, seats: &[&str]) -> NewReservation {
        NewReservation {
            user_id: user.id,
            movie_id: None,
            showtime_id: showtime.id,
            seats: seats.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_movie_titles_are_unique() {
        let store = InMemoryStore::new();
        let first = movie(&store, "Inception", "Sci-Fi").await;
        let dup = store
            .create_movie(&MovieInput {
                title: "Inception".to_string(),
                description: String::new(),
                genre: String::new(),
                poster_image: String::new(),
            })
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        // Renaming a movie to its own title is fine.
        let renamed = store
            .update_movie(
                first.id,
                &MovieInput {
                    title: "Inception".to_string(),
                    description: "Dreams".to_string(),
                    genre: "Sci-Fi".to_string(),
                    poster_image: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.description, "Dreams");
    }

    #[tokio::test]
    async fn test_genre_filter_is_case_insensitive_substring() {
        let store = InMemoryStore::new();
        movie(&store, "Inception", "Sci-Fi").await;
        movie(&store, "The Dark Knight", "Action").await;

        let filter = MovieFilter {
            genre: Some("sci".to_string()),
        };
        let found = store.list_movies(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Inception");
        assert_eq!(store.list_movies(&MovieFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deleting_a_movie_cascades() {
        let store = InMemoryStore::new();
        let film = movie(&store, "Interstellar", "Sci-Fi").await;
        let show = showtime(&store, film.id, 10).await;
        let alice = user(&store, "alice").await;
        let layout = SeatLayout::default();
        let reservation = store.book(&booking(&alice, &show, &["A1"]), &layout).await.unwrap();

        store.delete_movie(film.id).await.unwrap();

        assert!(matches!(store.get_showtime(show.id).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(
            store.cancel(reservation.id, Access::Any, Utc::now()).await,
            Err(LedgerError::NotFound { .. })
        ));
        assert!(store.all_reservations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_showtime_requires_existing_movie() {
        let store = InMemoryStore::new();
        let result = store
            .create_showtime(&ShowtimeInput {
                movie_id: Uuid::new_v4(),
                start_time: Utc::now(),
                capacity: 10,
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "movie", .. })));
    }

    #[tokio::test]
    async fn test_capacity_cannot_strand_reserved_seats() {
        let store = InMemoryStore::new();
        let film = movie(&store, "Inception", "Sci-Fi").await;
        let show = showtime(&store, film.id, 40).await;
        let alice = user(&store, "alice").await;
        let layout = SeatLayout::default();
        store.book(&booking(&alice, &show, &["B1"]), &layout).await.unwrap();

        let shrink = ShowtimeInput {
            movie_id: film.id,
            start_time: show.start_time,
            capacity: 20,
        };
        assert!(matches!(
            store.update_showtime(show.id, &shrink, &layout).await,
            Err(StoreError::Invalid(_))
        ));

        let grow = ShowtimeInput {
            capacity: 21,
            ..shrink
        };
        let updated = store.update_showtime(show.id, &grow, &layout).await.unwrap();
        assert_eq!(updated.capacity, 21);
        assert_eq!(updated.reserved, 1);
    }

    #[tokio::test]
    async fn test_usernames_are_unique() {
        let store = InMemoryStore::new();
        user(&store, "alice").await;
        let dup = store
            .create_user(&NewUser {
                username: "alice".to_string(),
                password_hash: "other".to_string(),
                role: Role::Admin,
            })
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        assert!(store.find_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_booking_requires_existing_user() {
        let store = InMemoryStore::new();
        let film = movie(&store, "Inception", "Sci-Fi").await;
        let show = showtime(&store, film.id, 10).await;
        let ghost = NewReservation {
            user_id: Uuid::new_v4(),
            movie_id: None,
            showtime_id: show.id,
            seats: vec!["A1".to_string()],
        };
        assert!(matches!(
            store.book(&ghost, &SeatLayout::default()).await,
            Err(LedgerError::NotFound { entity: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_reporting_queries() {
        let store = InMemoryStore::new();
        let inception = movie(&store, "Inception", "Sci-Fi").await;
        let knight = movie(&store, "The Dark Knight", "Action").await;
        let show = showtime(&store, inception.id, 10).await;
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let layout = SeatLayout::default();

        store.book(&booking(&alice, &show, &["A1", "A2"]), &layout).await.unwrap();
        store.book(&booking(&bob, &show, &["A3"]), &layout).await.unwrap();

        assert_eq!(store.reservations_for_user(alice.id).await.unwrap().len(), 1);
        assert_eq!(store.all_reservations().await.unwrap().len(), 2);

        let counts = store.reservation_counts_for_movie(inception.id).await.unwrap();
        assert_eq!(counts.reservation_count, 2);
        assert_eq!(counts.seat_count, 3);
        assert_eq!(counts.movie_title, "Inception");

        let totals = store.seats_per_movie().await.unwrap();
        assert_eq!(
            totals,
            vec![
                MovieSeatTotal {
                    title: "Inception".to_string(),
                    seats_reserved: 3,
                },
                MovieSeatTotal {
                    title: knight.title.clone(),
                    seats_reserved: 0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_refuses_to_drive_counter_negative() {
        let store = InMemoryStore::new();
        let inception = movie(&store, "Inception", "Sci-Fi").await;
        let show = showtime(&store, inception.id, 20).await;
        let alice = user(&store, "alice").await;
        let layout = SeatLayout::default();

        let reservation = store.book(&booking(&alice, &show, &["A1", "A2"]), &layout).await.unwrap();
        if let Some(slot) = store.slot(show.id) {
            slot.lock().await.showtime.reserved = 1;
        }

        let result = store.cancel(reservation.id, Access::Any, Utc::now()).await;
        assert!(matches!(result, Err(LedgerError::Inconsistent(_))));

        // Nothing was released.
        assert_eq!(store.get_showtime(show.id).await.unwrap().reserved, 1);
        assert_eq!(store.all_reservations().await.unwrap().len(), 1);
    }
}
