//! PostgreSQL store tests.
//!
//! Ignored by default: they need a reachable server in `DATABASE_URL`. Run with
//! `cargo test --test postgres -- --ignored`. Each test gets a fresh database with the
//! migrations applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use cinema_server::auth::Role;
use cinema_server::ledger::{Access, LedgerError, ReservationLedger};
use cinema_server::models::{MovieInput, NewUser, ReservationRequest, Showtime, ShowtimeInput, User};
use cinema_server::seating::SeatLayout;
use cinema_server::store::{MovieStore, PgStore, ReservationStore, ShowtimeStore, StoreError, UserStore};

async fn setup(pool: PgPool, starts_in: ChronoDuration) -> (Arc<PgStore>, ReservationLedger, Showtime, User) {
    let store = Arc::new(PgStore::new(pool));
    let ledger = ReservationLedger::new(store.clone(), SeatLayout::default(), Duration::from_secs(5));

    let movie = store
        .create_movie(&MovieInput {
            title: "Interstellar".to_string(),
            description: String::new(),
            genre: "Sci-Fi".to_string(),
            poster_image: String::new(),
        })
        .await
        .unwrap();
    let showtime = store
        .create_showtime(&ShowtimeInput {
            movie_id: movie.id,
            start_time: Utc::now() + starts_in,
            capacity: 100,
        })
        .await
        .unwrap();
    let user = store
        .create_user(&NewUser {
            username: "alice".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        })
        .await
        .unwrap();

    (store, ledger, showtime, user)
}

fn request(user: &User, showtime: &Showtime, seats: &[&str]) -> ReservationRequest {
    ReservationRequest {
        user_id: Some(user.id),
        movie_id: None,
        showtime_id: Some(showtime.id),
        seats: seats.iter().map(|s| s.to_string()).collect(),
    }
}

#[sqlx::test]
#[ignore]
async fn test_concurrent_overlapping_bookings_admit_one(pool: PgPool) {
    let (store, ledger, showtime, user) = setup(pool, ChronoDuration::hours(2)).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = ledger.clone();
        let own = format!("D{}", i + 1);
        let request = request(&user, &showtime, &["C3", own.as_str()]);
        handles.push(tokio::spawn(async move { ledger.book(request, Access::Any).await }));
    }

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(LedgerError::SeatConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 2);
}

#[sqlx::test]
#[ignore]
async fn test_book_and_cancel_keep_counter_in_sync(pool: PgPool) {
    let (store, ledger, showtime, user) = setup(pool, ChronoDuration::hours(2)).await;

    let first = ledger.book(request(&user, &showtime, &["A1", "A2"]), Access::Any).await.unwrap();
    ledger.book(request(&user, &showtime, &["A3"]), Access::Any).await.unwrap();
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 3);

    ledger.cancel(first.id, Access::Any).await.unwrap();
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 1);
    assert!(matches!(
        ledger.cancel(first.id, Access::Any).await,
        Err(LedgerError::NotFound { .. })
    ));

    let available = ledger.available_seats(showtime.id).await.unwrap();
    assert_eq!(available.len(), 99);
    assert!(!available.contains(&"A3".to_string()));
    assert_eq!(store.reservations_for_user(user.id).await.unwrap().len(), 1);
}

#[sqlx::test]
#[ignore]
async fn test_started_showtime_is_not_cancellable(pool: PgPool) {
    let (store, ledger, showtime, user) = setup(pool, -ChronoDuration::minutes(1)).await;

    let reservation = ledger.book(request(&user, &showtime, &["A1"]), Access::Any).await.unwrap();
    assert!(matches!(
        ledger.cancel(reservation.id, Access::Any).await,
        Err(LedgerError::PastShowtime { .. })
    ));
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 1);
}

#[sqlx::test]
#[ignore]
async fn test_catalog_constraints(pool: PgPool) {
    let (store, _ledger, showtime, user) = setup(pool, ChronoDuration::hours(2)).await;

    let duplicate = store
        .create_movie(&MovieInput {
            title: "Interstellar".to_string(),
            description: String::new(),
            genre: String::new(),
            poster_image: String::new(),
        })
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let taken = store
        .create_user(&NewUser {
            username: user.username.clone(),
            password_hash: "other".to_string(),
            role: Role::User,
        })
        .await;
    assert!(matches!(taken, Err(StoreError::Conflict(_))));

    let orphan = store
        .create_showtime(&ShowtimeInput {
            movie_id: uuid::Uuid::new_v4(),
            start_time: Utc::now(),
            capacity: 10,
        })
        .await;
    assert!(matches!(orphan, Err(StoreError::NotFound { entity: "movie", .. })));

    store.delete_movie(showtime.movie_id).await.unwrap();
    assert!(matches!(
        store.get_showtime(showtime.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[sqlx::test]
#[ignore]
async fn test_seat_table_backstop_reports_only_colliding_seats(pool: PgPool) {
    let (store, ledger, showtime, user) = setup(pool.clone(), ChronoDuration::hours(2)).await;

    // A1 is held in reserved_seats by a writer that bypassed the ledger, so the
    // reservations.seats overlap check cannot see it.
    let stray = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO reservations (id, user_id, movie_id, showtime_id, seats)
         VALUES ($1, $2, $3, $4, ARRAY['J20'])",
    )
    .bind(stray)
    .bind(user.id)
    .bind(showtime.movie_id)
    .bind(showtime.id)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO reserved_seats (showtime_id, seat_label, reservation_id) VALUES ($1, 'A1', $2)")
        .bind(showtime.id)
        .bind(stray)
        .execute(&pool)
        .await
        .unwrap();

    match ledger.book(request(&user, &showtime, &["A1", "A2"]), Access::Any).await {
        Err(LedgerError::SeatConflict { seats }) => assert_eq!(seats, vec!["A1"]),
        other => panic!("expected SeatConflict, got {other:?}"),
    }

    let reservations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(reservations, 1);
    let a2_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reserved_seats WHERE seat_label = 'A2'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(a2_rows, 0);
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 0);
}

#[sqlx::test]
#[ignore]
async fn test_cancel_checks_owner_under_lock(pool: PgPool) {
    let (store, ledger, showtime, user) = setup(pool, ChronoDuration::hours(2)).await;
    let reservation = ledger
        .book(request(&user, &showtime, &["B1"]), Access::Own(user.id))
        .await
        .unwrap();

    assert!(matches!(
        ledger.cancel(reservation.id, Access::Own(uuid::Uuid::new_v4())).await,
        Err(LedgerError::NotOwner { .. })
    ));
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 1);

    ledger.cancel(reservation.id, Access::Own(user.id)).await.unwrap();
    assert_eq!(store.get_showtime(showtime.id).await.unwrap().reserved, 0);
}
