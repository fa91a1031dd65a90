mod auth;
mod config;
mod connection;
mod events;
mod hub;
mod messages;
mod repository;
mod routes;
mod session;
#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use engine::EnginePool;
use tracing_subscriber::EnvFilter;

use auth::ApiKeyAuth;
use events::Publisher;
use hub::Hub;
use repository::InMemoryRepository;
use routes::AppState;
use session::SessionManager;

#[derive(Debug, Parser)]
#[command(name = "chessmux-server", about = "Multiplexing server for UCI chess engines")]
struct Cli {
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = config::Config::load(cli.debug, &cli.port)?;
    tracing::info!(
        engine_path = %config.engine_path.display(),
        pool_size = config.pool_size,
        "starting chessmux server"
    );

    let publisher = Arc::new(Publisher::new());
    if config.debug {
        publisher.subscribe_all(|event| async move {
            tracing::debug!(
                event_type = ?event.event_type,
                game_id = ?event.game_id,
                "bus event"
            );
        });
    }
    let repository = Arc::new(InMemoryRepository::new());

    let pool = Arc::new(EnginePool::new(&config.engine_path, config.pool_size));
    pool.initialize().await?;

    let manager = SessionManager::new(
        repository,
        Arc::clone(&pool),
        Arc::clone(&publisher),
    );
    let hub = Hub::new(manager, Arc::clone(&publisher));
    tokio::spawn(Arc::clone(&hub).run());

    let auth = Arc::new(ApiKeyAuth::new(config.api_keys.clone()));
    if !auth.is_enabled() {
        tracing::warn!("API_KEYS not set, API key auth disabled");
    }

    let state = AppState {
        hub,
        auth,
        frontend_origin: config.frontend_origin.clone(),
        started_at: Instant::now(),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    tracing::info!("server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
