pub mod auth;
pub mod config;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod seating;
pub mod seed;
pub mod store;
pub mod telemetry;
pub mod utils;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::CredentialService;
use crate::config::Config;
use crate::ledger::ReservationLedger;
use crate::store::Database;

/// Shared handles passed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub ledger: ReservationLedger,
    pub credentials: CredentialService,
    pub config: Arc<Config>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<dyn Database>) -> Self {
        let ledger = ReservationLedger::new(db.clone(), config.seat_layout.clone(), config.request_timeout);
        let credentials = CredentialService::new(&config.secret_key, config.token_ttl);
        Self {
            db,
            ledger,
            credentials,
            config: Arc::new(config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
