//! Coach Server
//!
//! Serves computer-chess move suggestions and post-move quality analysis to
//! WebSocket clients by multiplexing requests over pooled engine processes.

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use coach_server::config::CoachConfig;
use coach_server::state::AppState;
use coach_server::{coordinator, stats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = CoachConfig::load().context("loading configuration")?;
    let state = AppState::initialize(&config)
        .await
        .context("warming engine pools")?;

    // CORS layer so the browser extension can reach the local endpoints.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(stats::health))
        .route("/stats", get(stats::stats))
        .route("/ws", get(coordinator::ws_handler))
        .with_state(state)
        .layer(cors);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("parsing listen_addr '{}'", config.listen_addr))?;
    tracing::info!("coach server listening on ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listen address")?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
