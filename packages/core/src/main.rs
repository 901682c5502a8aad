use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use educar::api;
use educar::cli::Cli;
use educar::config::{Config, StorageBackend};
use educar::db;
use educar::error::AppError;
use educar::logging::init_logging;
use educar::metrics::AppMetrics;
use educar::repository::SqliteTimetable;
use educar::schedule::{ScheduleConflictGuard, TimetableStore};
use educar::store::InMemoryTimetable;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env()
        .and_then(|config| config.apply_cli(&cli))
        .map_err(AppError::Config)?;

    tracing::info!(
        storage = ?config.storage,
        bind = %config.bind_addr,
        "Starting Educar timetable service"
    );

    let store: Arc<dyn TimetableStore + Send + Sync> = match config.storage {
        StorageBackend::Sqlite => {
            let pool = db::create_pool(&config.database_url).await?;
            tracing::info!(
                schema_version = db::latest_schema_version(),
                "Database ready"
            );
            Arc::new(SqliteTimetable::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory timetable; entries are lost on restart");
            Arc::new(InMemoryTimetable::new())
        }
    };

    let guard = Arc::new(ScheduleConflictGuard::new(store));
    let metrics = Arc::new(AppMetrics::new()?);
    let app = api::router(guard, metrics);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        // Without a signal handler, keep serving until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
