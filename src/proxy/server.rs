use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::auth::{get_codewhisperer_host, AuthError, TokenStore};
use crate::constants::{DEFAULT_REGION, DEFAULT_STREAM_JITTER_MS};
use crate::error::AppResult;
use crate::proxy::handlers;

#[derive(Clone)]
pub struct AppState {
    pub token_store: Arc<TokenStore>,
    pub client: reqwest::Client,
    pub upstream_host: String,
    /// Upper bound (exclusive, ms) of the random pause between streamed
    /// SSE events; 0 disables pacing.
    pub stream_jitter_ms: u64,
}

impl AppState {
    pub fn new() -> Result<Self, AuthError> {
        let stream_jitter_ms = std::env::var("KIRO2CC_STREAM_JITTER_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STREAM_JITTER_MS);

        Ok(Self {
            token_store: Arc::new(TokenStore::new()?),
            client: reqwest::Client::new(),
            upstream_host: get_codewhisperer_host(DEFAULT_REGION),
            stream_jitter_ms,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::messages::handle_messages))
        .route("/health", get(health_handler))
        .fallback(fallback_handler)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 not found")
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let resp = next.run(req).await;

    info!(
        "{} {} -> {} ({}ms)",
        method,
        path,
        resp.status().as_u16(),
        start.elapsed().as_millis()
    );
    resp
}

/// Bind and run the proxy until the process is stopped.
pub async fn serve(port: u16) -> AppResult<()> {
    let state = AppState::new()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Anthropic proxy listening on port {}", port);
    info!("  POST /v1/messages - Anthropic messages endpoint");
    info!("  GET  /health      - health check");

    axum::serve(listener, app).await?;
    Ok(())
}
