//! Cronwork Server: scheduled job execution engine
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use cronwork_api::{AppState, build_router};
use cronwork_core::config::AppConfig;
use cronwork_core::error::AppError;
use cronwork_database::build_run_store;
use cronwork_worker::{CronJobMetrics, CronScheduler, build_job_definition};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and `CRONWORK__*` environment variables
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("CRONWORK_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Cronwork v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Run store (connects and migrates for PostgreSQL) ──
    let store = build_run_store(&config.database).await?;
    tracing::info!("Run store ready (backend: {:?})", config.database.backend);

    // ── Step 2: Metrics sink ─────────────────────────────────────
    let metrics = Arc::new(CronJobMetrics::new()?);

    // ── Step 3: Scheduler, job registration and recovery ─────────
    let scheduler = Arc::new(CronScheduler::new(
        Arc::clone(&store),
        Arc::clone(&metrics),
        config.scheduler.clone(),
    ));

    let mut loops = Vec::new();
    if config.scheduler.enabled {
        for job in &config.jobs {
            let definition =
                match build_job_definition(job, &config.scheduler, &config.metrics) {
                    Ok(definition) => definition,
                    Err(e) => {
                        tracing::error!("Skipping job '{}': {}", job.name, e);
                        continue;
                    }
                };

            match scheduler.register(definition).await {
                Ok(handle) => loops.push(scheduler.spawn(handle)),
                Err(e) => tracing::error!("Skipping job '{}': {}", job.name, e),
            }
        }
        tracing::info!(
            "{} of {} configured job(s) scheduled",
            loops.len(),
            config.jobs.len()
        );
    } else {
        tracing::warn!("Scheduler disabled; no jobs will run");
    }

    // ── Step 4: HTTP server ──────────────────────────────────────
    let app_state = AppState::new(Arc::clone(&store), Arc::clone(&metrics), "Cronwork");
    let app = build_router(app_state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Cronwork listening on {}", addr);

    // ── Step 5: Graceful shutdown ────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // ── Step 6: Stop timing loops and drain in-flight runs ───────
    let drained = scheduler.shutdown(config.scheduler.shutdown_grace()).await;
    for handle in loops {
        let _ = handle.await;
    }
    store.close().await;

    if drained {
        tracing::info!("Cronwork shut down gracefully");
    } else {
        tracing::warn!("Cronwork shut down with runs still in flight; they will be recovered on restart");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
