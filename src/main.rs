//! chat-gateway server entry point.
//!
//! Starts the Axum HTTP server with the websocket endpoint and system
//! routes, and runs the bounded drain once a shutdown signal arrives.

use std::sync::Arc;

use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chat_gateway::api;
use chat_gateway::app_state::AppState;
use chat_gateway::config::GatewayConfig;
use chat_gateway::domain::ConnectionRegistry;
use chat_gateway::lifecycle::Lifecycle;
use chat_gateway::metrics::init_metrics_recorder;
use chat_gateway::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, prefix = %config.ws_path_prefix, "starting chat-gateway");

    let metrics = if config.metrics_enabled {
        Some(init_metrics_recorder()?)
    } else {
        None
    };

    // Startup: the broadcaster runs before the first connection is accepted
    let registry = Arc::new(ConnectionRegistry::new());
    let lifecycle = Lifecycle::start(Arc::clone(&registry), config.lifecycle);

    let app_state = AppState {
        registry,
        settings: config.lifecycle,
        readiness: lifecycle.readiness_token(),
        metrics,
    };

    let app = api::build_router(&config.ws_path_prefix)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let report = server::serve(listener, app, lifecycle, shutdown_signal()).await?;
    tracing::info!(
        closed = report.closed,
        abandoned = report.abandoned,
        duration_ms = report.duration.as_millis(),
        "chat-gateway stopped"
    );

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("received SIGINT, shutting down"),
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
