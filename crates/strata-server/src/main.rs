//! strata-server - REST API server binary.

use std::net::SocketAddr;

use strata_core::{BackgroundRuntime, EngineConfig, TieringEngine};
use strata_server::{create_server_with_limit, AppState, DEFAULT_CONCURRENCY_LIMIT};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("strata_server=debug".parse()?);
    let json = std::env::var("STRATA_LOG_JSON").is_ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
    Ok(())
}

/// `STRATA_CONFIG` names a TOML/JSON/YAML file; otherwise `STRATA_*`
/// variables are applied over the defaults.
fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match std::env::var("STRATA_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading engine configuration from file");
            Ok(EngineConfig::from_file(path)?)
        }
        Err(_) => {
            let config = EngineConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let host = std::env::var("STRATA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("STRATA_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| format!("STRATA_PORT must be a valid port number: {}", e))?;
    let max_in_flight = std::env::var("STRATA_MAX_IN_FLIGHT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY_LIMIT);

    let config = load_config()?;
    let engine = TieringEngine::builder(config).build()?;

    let mut runtime = BackgroundRuntime::new(engine.clone()).await?;
    runtime.start().await?;
    info!(jobs = runtime.jobs().len(), "Background maintenance started");

    let state = AppState::new_with_runtime(engine.clone(), runtime);
    let app = create_server_with_limit(state.clone(), max_in_flight);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting strata-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping background jobs...");
        })
        .await?;

    if let Some(mut runtime) = state.take_runtime().await {
        runtime.shutdown().await?;
    }
    engine.shutdown().await;

    info!("Server stopped cleanly");
    Ok(())
}
