//! Voice assistant server entry point

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_assistant_config::{load_settings, Settings};
use voice_assistant_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from files and environment
    // Priority: env vars > config/{env}.toml > config/default.toml > defaults
    let env = std::env::var("VOICE_ASSISTANT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "starting voice assistant server"
    );

    let _metrics_handle = init_metrics();
    tracing::info!("Prometheus metrics at /metrics");

    let state = AppState::from_settings(config.clone())?;

    // Background sweep for idle sessions
    let _cleanup_shutdown = state.registry.start_cleanup_task();

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize tracing with env-filter; JSON output in strict environments
fn init_tracing(config: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,voice_assistant=debug"));

    if config.environment.is_strict() {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_filter(filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    }
}
