use std::time::Duration;

use axum::{Router, body::Body, http::Request, middleware, routing::get};
use rp_api::{config::ApiConfig, state::ApiState};
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment variables
    dotenvy::dotenv().ok();
    let config = ApiConfig::from_env()?;

    rp_api::tracing::init_tracing(&config.env);
    tracing::info!(config = ?config, "Configuration loaded");

    let metrics_handle = rp_api::metrics::init_metrics()?;

    // Fails startup if the envelope key or OP endpoints are unusable
    let state = ApiState::new(&config)?;

    // Spans carry the path only; callback query strings hold authorization codes
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!("http", method = %req.method(), path = %req.uri().path())
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_app = Router::new()
        .route("/metrics", get(rp_api::metrics::metrics_handler))
        .with_state(metrics_handle);

    let app = rp_api::router::router()
        .merge(metrics_app)
        .with_state(state)
        .layer(middleware::from_fn(rp_api::metrics::track_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(config.http_timeout_secs)))
        .layer(trace_layer)
        .layer(middleware::from_fn(
            rp_api::middleware::request_id::request_id_middleware,
        ));

    let app = rp_api::middleware::security_headers::apply_security_headers(app, config.env);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        ext_host = %config.ext_host,
        "Relying party listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}
