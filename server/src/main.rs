use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use cinema_server::config::Config;
use cinema_server::routes::create_routes;
use cinema_server::store::{Database, InMemoryStore, PgStore};
use cinema_server::{seed, telemetry, AppState};

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

async fn connect(config: &Config) -> anyhow::Result<Arc<dyn Database>> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
        return Ok(Arc::new(InMemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations run successfully");

    Ok(Arc::new(PgStore::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;
    let db = connect(&config).await?;

    seed::run(db.as_ref(), &config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to seed data: {e}"))?;

    let metrics = telemetry::install_recorder().context("Failed to install metrics recorder")?;
    let addr = config.listen_addr();
    let app = create_routes(AppState::new(config, db).with_metrics(metrics));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("🚀 Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    Ok(())
}
