use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use nasbridge::{
    arguments::{get_config_path, is_help_requested, print_debug_info, print_help},
    config,
    engine::{BreakerSettings, CircuitBreaker, EngineClient},
    logger::{self as logger, LogTag},
    realtime::{sources, Hub},
    server::{self, AppState},
};

/// Main entry point for the gateway
///
/// Startup order matters: config first (pollers and connections read it
/// through the global accessor), then the engine client, breaker and hub,
/// then the pollers, and the blocking server call last.
#[tokio::main]
async fn main() {
    logger::init();

    // Check for help request first (before any other processing)
    if is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    logger::info(LogTag::System, "nasbridge gateway starting up...");

    // Print debug information if any debug modes are enabled
    print_debug_info();

    // Load configuration (creates a default file on first run)
    let config_path = get_config_path().unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    if let Err(e) = config::init(&config_path) {
        logger::error(
            LogTag::Config,
            &format!("Failed to load configuration from {}: {:#}", config_path, e),
        );
        std::process::exit(1);
    }

    // Core components: engine client, shared breaker, distribution hub
    let engine = config::with_config(|cfg| EngineClient::new(&cfg.engine));
    let breaker = Arc::new(CircuitBreaker::new(
        "engine",
        config::with_config(|cfg| BreakerSettings::from_config(&cfg.circuit_breaker)),
    ));
    let hub = config::with_config(|cfg| Hub::new(cfg.websocket.send_buffer_size));

    // Shutdown fan-out: pollers and connections all watch this channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_ctx = sources::PollContext {
        hub: Arc::clone(&hub),
        engine,
        breaker: Arc::clone(&breaker),
        shutdown: shutdown_rx.clone(),
    };
    let poller_handles = sources::start_all(&poll_ctx);

    // Ctrl+C stops the server; teardown continues below once it returns
    if let Err(e) = ctrlc::set_handler(move || {
        logger::info(LogTag::System, "Shutdown requested (Ctrl+C)");
        server::shutdown();
    }) {
        logger::error(
            LogTag::System,
            &format!("Failed to install Ctrl+C handler: {}", e),
        );
        std::process::exit(1);
    }

    let state = AppState::new(Arc::clone(&hub), Arc::clone(&breaker), shutdown_rx);
    if let Err(e) = server::start_server(state).await {
        logger::error(LogTag::System, &format!("Gateway failed: {}", e));
        std::process::exit(1);
    }

    // Graceful teardown: signal pollers and connections, then drain
    logger::info(LogTag::System, "Stopping background tasks...");
    let _ = shutdown_tx.send(true);

    let drain = futures::future::join_all(poller_handles);
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        logger::warning(LogTag::System, "Pollers did not stop within grace period");
    }

    hub.shutdown().await;

    logger::info(LogTag::System, "nasbridge gateway stopped");
}
