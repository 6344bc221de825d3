//! Binds the gateway's two dialect routers behind the proxy-key auth layer
//! and serves them over HTTP.

pub mod auth;
mod logger;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use auth::{AuthLayer, Dialect};
use axum::routing::get;
use axum::{Json, Router};
use config::Config;
use llm::Gateway;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use logger::init as init_logger;

/// Distinguishes a bind failure (exit code 2) from every other startup/runtime
/// error (exit code 1) so the binary can map this to the right process exit.
#[derive(Debug)]
pub enum ServeError {
    /// The listen address could not be parsed, or the bind itself failed.
    Bind(anyhow::Error),
    /// Any other failure once the server is up and running.
    Runtime(anyhow::Error),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeError::Bind(e) => write!(f, "{e}"),
            ServeError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ServeError {}

/// Starts and runs the gateway with the provided configuration.
///
/// Binds `config.server_host:config.server_port`, spawns the credential
/// pool's background refreshers, and serves until `shutdown_signal` fires.
pub async fn serve(config: Config, shutdown_signal: CancellationToken) -> Result<(), ServeError> {
    let listen_address: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .map_err(|e| ServeError::Bind(anyhow::anyhow!("invalid SERVER_HOST/SERVER_PORT: {e}")))?;

    let gateway = Gateway::new(&config);
    gateway.spawn_background_refreshers(shutdown_signal.clone());

    let app = build_router(gateway, config.proxy_api_key.expose_secret());

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| ServeError::Bind(anyhow::anyhow!("failed to bind to {listen_address}: {e}")))?;

    log::info!("kirogate listening on http://{listen_address}");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(|e| ServeError::Runtime(anyhow::anyhow!("server error: {e}")))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully");
        }
    }

    Ok(())
}

async fn root() -> &'static str {
    "kirogate"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Assembles the merged router: the open `/` and `/health` routes plus both
/// dialect sub-routers, each guarded by its own [`AuthLayer`]. Split out of
/// [`serve`] so integration tests can drive it directly over a real listener
/// without going through environment-based configuration loading.
pub fn build_router(gateway: Arc<Gateway>, proxy_api_key: &str) -> Router {
    let openai_router =
        llm::openai_router(gateway.clone()).layer(AuthLayer::new(proxy_api_key.to_string().into(), Dialect::OpenAi));
    let anthropic_router = llm::anthropic_router(gateway)
        .layer(AuthLayer::new(proxy_api_key.to_string().into(), Dialect::Anthropic));

    Router::new().route("/", get(root)).route("/health", get(health)).merge(openai_router).merge(anthropic_router)
}
