/// Axum gateway server
///
/// Hosts the `/ws` upgrade endpoint for realtime clients and a small
/// `/api/status` route for observability. Blocks until shutdown is
/// triggered, then terminates gracefully.
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};

use crate::config;
use crate::engine::CircuitBreaker;
use crate::logger::{self, LogTag};
use crate::realtime::{connection, Hub};

/// Global shutdown notifier
static SHUTDOWN_NOTIFY: once_cell::sync::Lazy<Arc<Notify>> =
    once_cell::sync::Lazy::new(|| Arc::new(Notify::new()));

/// Shared state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub breaker: Arc<CircuitBreaker>,
    /// Handed to each connection so graceful shutdown reaches every socket
    pub shutdown: watch::Receiver<bool>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        hub: Arc<Hub>,
        breaker: Arc<CircuitBreaker>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            hub,
            breaker,
            shutdown,
            startup_time: chrono::Utc::now(),
        }
    }
}

/// Start the gateway server
///
/// This function blocks until the server is shut down
pub async fn start_server(state: AppState) -> Result<(), String> {
    let (host, port) = config::with_config(|cfg| (cfg.gateway.host.clone(), cfg.gateway.port));

    logger::debug(
        LogTag::Webserver,
        &format!("Starting gateway server on {}:{}", host, port),
    );

    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid bind address {}:{}: {}", host, port, e))?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        // Provide helpful error message for common cases
        match e.kind() {
            std::io::ErrorKind::AddrInUse => {
                format!(
                    "Failed to bind to {}: Address already in use\n\
                     \n\
                     This usually means another instance of the gateway is running.\n\
                     Check with: ps aux | grep nasbridge | grep -v grep",
                    addr
                )
            }
            std::io::ErrorKind::PermissionDenied => {
                format!(
                    "Failed to bind to {}: Permission denied\n\
                     \n\
                     Port {} requires elevated privileges on this system.\n\
                     Consider using a port above 1024 or running with appropriate permissions.",
                    addr, port
                )
            }
            _ => format!("Failed to bind to {}: {}", addr, e),
        }
    })?;

    logger::info(
        LogTag::Webserver,
        &format!("Gateway listening on http://{}", addr),
    );
    logger::debug(
        LogTag::Webserver,
        &format!("Realtime endpoint at ws://{}/ws", addr),
    );

    let shutdown_signal = async {
        SHUTDOWN_NOTIFY.notified().await;
        logger::debug(
            LogTag::Webserver,
            "Received shutdown signal, stopping gateway server...",
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    logger::info(LogTag::Webserver, "Gateway server stopped");

    Ok(())
}

/// Trigger server shutdown
pub fn shutdown() {
    logger::debug(LogTag::Webserver, "Triggering gateway shutdown...");
    SHUTDOWN_NOTIFY.notify_one();
}

/// Build the Axum application with all routes
fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
}

/// Upgrade an HTTP request to a realtime WebSocket connection
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.hub, state.shutdown))
}

/// Report gateway health: connected clients, hub counters, breaker status
async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_secs = (chrono::Utc::now() - state.startup_time).num_seconds();

    Json(json!({
        "uptime_secs": uptime_secs,
        "clients": state.hub.client_count().await,
        "hub": state.hub.metrics().snapshot(),
        "engine_breaker": state.breaker.status(),
    }))
}
