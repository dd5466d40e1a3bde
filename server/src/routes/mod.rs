use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{require_admin, require_user};
use crate::config::{apply_security_headers, create_cors_layer};
use crate::handlers::{auth, health_check, movies, reports, reservations, showtimes};
use crate::telemetry;
use crate::AppState;

pub fn create_routes(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(telemetry::render))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login));

    let user = Router::new()
        .route("/movies", get(movies::list_movies))
        .route("/showtimes", get(showtimes::list_showtimes))
        .route("/showtimes/seats/:id", get(showtimes::available_seats))
        .route("/reserve", get(reservations::my_reservations))
        .route("/reserve/add", post(reservations::reserve))
        .route("/reserve/delete/:id", delete(reservations::cancel))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin = Router::new()
        .route("/movies/add", post(movies::create_movie))
        .route("/movies/update/:id", put(movies::update_movie))
        .route("/movies/delete/:id", delete(movies::delete_movie))
        .route("/showtimes/add", post(showtimes::create_showtime))
        .route("/showtimes/update/:id", put(showtimes::update_showtime))
        .route("/showtimes/delete/:id", delete(showtimes::delete_showtime))
        .route("/reserve/all", get(reservations::all_reservations))
        .route("/reserve/movie/:id", get(reservations::reservations_for_movie))
        .route("/revenue", get(reports::revenue))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let cors = create_cors_layer(&state.config.cors_allowed_origins);
    let include_hsts = state.config.production;

    let router = public
        .merge(user)
        .merge(admin)
        .route_layer(middleware::from_fn(telemetry::track_requests))
        .with_state(state);

    apply_security_headers(router, include_hsts).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}
