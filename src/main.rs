mod auth;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod sync;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use config::Config;
use docs::ApiDoc;
use handlers::health_check;
use routes::api::create_api_routes;
use services::persist_service;
use std::panic;
use std::sync::Arc;
use sync::registry::RoomRegistry;
use sync::server::{run_relay, RelayState};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Fan-out buffer per room; lagging receivers drop frames and resync.
const ROOM_CHANNEL_CAPACITY: usize = 256;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "coderoom=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config.clone());

    // Initialize database connection if URL is provided
    if let Some(db_url) = &config.db_url {
        match db::dbroom::init_db(db_url).await {
            Ok(_) => info!("Database initialized successfully"),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Document persistence and room seeding will not be available");
            }
        }
    } else {
        warn!("No database URL configured - document persistence will not be available");
    }

    // The registry owns every live room; relay, autosave and HTTP
    // handlers all reach rooms through it.
    let registry = Arc::new(RoomRegistry::new(
        config.room_grace(),
        ROOM_CHANNEL_CAPACITY,
    ));

    // Graceful shutdown: SIGINT flips the watch, everything drains.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received, stopping...");
            let _ = shutdown_tx.send(true);
        });
    }

    // Start the sync relay
    let relay_state = Arc::new(RelayState {
        registry: registry.clone(),
        compress_threshold: config.compress_threshold,
    });
    let relay_listener = tokio::net::TcpListener::bind(config.relay_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind sync relay to {}", config.relay_address()));
    let relay_handle = tokio::spawn(run_relay(
        relay_listener,
        relay_state,
        shutdown_rx.clone(),
    ));

    // Start the autosave pass over dirty rooms
    let autosave_handle = tokio::spawn(persist_service::autosave_loop(
        registry.clone(),
        config.save_interval(),
        shutdown_rx.clone(),
    ));

    // CORS for the HTTP API
    let cors = match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    // Combine all routes
    let app_routes = Router::new()
        // Public liveness surface
        .route("/health", get(health_check))
        .with_state(registry.clone())
        // Mount API routes
        .nest("/api", create_api_routes(registry.clone()))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the HTTP/API server
    let http_listener = tokio::net::TcpListener::bind(config.http_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.http_address()));

    info!("HTTP API running on http://{}", config.http_address());
    info!("Sync relay available at ws://{}", config.relay_address());
    info!(
        "Swagger UI available at http://{}/swagger",
        config.http_address()
    );

    let mut http_shutdown = shutdown_rx.clone();
    axum::serve(http_listener, app_routes)
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.changed().await;
        })
        .await
        .expect("HTTP server failed");

    // Let the relay finish draining its connections before exiting.
    relay_handle.await.ok();
    autosave_handle.await.ok();
    info!("Shutdown complete");
}
