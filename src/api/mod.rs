pub mod error;
pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::run::config::RuntimeConfig;
use crate::run::progress::EngineContext;

use state::AppState;

pub fn router(ctx: Arc<EngineContext>, config: Arc<RuntimeConfig>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/config", get(handlers::market::get_config))
        .route("/api/event-platforms", get(handlers::market::event_platforms))
        .route("/api/orderbook/all", get(handlers::market::orderbook_all))
        .route("/api/route", get(handlers::market::find_route))
        .route("/api/order", post(handlers::orders::create_order))
        .route("/api/sell", post(handlers::orders::create_sell))
        .route("/api/order/{id}", get(handlers::orders::get_order))
        .route("/api/positions", get(handlers::orders::positions))
        .route("/api/kill-order/{id}", post(handlers::orders::kill_order))
        .layer(cors)
        .with_state(AppState::new(ctx, config))
}

/// Bind and serve the request plane. The caller is responsible for spawning
/// the progress loop; this function only handles HTTP.
pub async fn serve(host: &str, port: u16, ctx: Arc<EngineContext>, config: Arc<RuntimeConfig>) -> Result<()> {
    let app = router(ctx, config);
    let addr = format!("{host}:{port}");
    info!("api server listening on {addr}");
    println!("premarket-router listening on {addr}");
    println!("  Config:    GET  http://{addr}/api/config");
    println!("  Orderbook: GET  http://{addr}/api/orderbook/all?event_id=..&team=..");
    println!("  Route:     GET  http://{addr}/api/route?event_id=..&team=..&budget=..");
    println!("  Order:     POST http://{addr}/api/order");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    axum::serve(listener, app).await.context("running server")?;
    Ok(())
}
