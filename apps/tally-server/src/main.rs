mod bus;
mod cli;
mod config;
mod dispatcher;
mod handlers;
mod registry;
mod storage;
mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use sync_bus::Bus;
use tally_core::STATE_UPDATES_CHANNEL;

use crate::{
    bus::RedisBus,
    cli::{Cli, Commands},
    config::Config,
    dispatcher::Dispatcher,
    handlers::health_check,
    registry::{spawn_fanout_listener, Registry},
    storage::{RedisStore, StateStore},
    websocket::{websocket_handler, AppState},
};

#[tokio::main]
async fn main() {
    // Default to INFO level if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Check if running as debug client
    if let Some(Commands::Debug { url, command }) = cli.command {
        if let Err(e) = cli::run_debug_client(url, command).await {
            error!("Debug client error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Otherwise, run as server
    let config = Config::from_env();
    info!("Starting tally sync server on port {}", config.port);
    info!("Redis URL: {}", config.redis_url);
    info!("State TTL: {} seconds", config.state_ttl_seconds);

    let store: Arc<dyn StateStore> =
        match RedisStore::connect(&config.redis_url, config.state_ttl_seconds).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                std::process::exit(1);
            }
        };

    let fanout: Arc<dyn Bus> =
        match RedisBus::connect(&config.redis_url, &[STATE_UPDATES_CHANNEL]).await {
            Ok(b) => Arc::new(b),
            Err(e) => {
                error!("Failed to connect Redis pub/sub: {}", e);
                std::process::exit(1);
            }
        };

    let registry = Arc::new(Registry::new());
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), fanout.clone()));

    // One subscriber per process; it pushes refreshed state to whichever
    // of our connections a notification names.
    spawn_fanout_listener(fanout.as_ref(), registry.clone(), store.clone());

    // Purge this process's state entries before exiting; state must not
    // outlive the connections we hold.
    let purge_registry = registry.clone();
    let purge_store = store.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down. Cleaning up state entries...");
        purge_registry
            .purge_store_entries(purge_store.as_ref())
            .await;
        std::process::exit(0);
    });

    let app_state = AppState {
        registry,
        store,
        dispatcher,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("tally sync server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
