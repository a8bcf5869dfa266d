//! Media Conversion Server
//!
//! Accepts uploaded audio, image, video and document files over HTTP and
//! returns them converted to a requested format, using the
//! media-convert-lib core.

mod config;
mod config_file;
mod error;
mod http;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "media-converter";

/// Filter used when RUST_LOG is not set
fn default_log_filter(level: &str) -> String {
    format!(
        "media_converter={level},media_convert_lib={level},tower_http={level}",
        level = level
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    // `media-converter --init-config [path]` writes a default config file and exits
    if first.as_deref() == Some("--init-config") {
        let path = args.next().unwrap_or_else(|| "config.toml".to_string());
        crate::config_file::generate_default_config(&path)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    // Load configuration
    let config_path = first.unwrap_or_else(|| "config.toml".to_string());
    let (config, load_error) = if std::path::Path::new(&config_path).exists() {
        match crate::config_file::ConfigFile::from_file(&config_path) {
            Ok(cf) => (cf.into_server_config(), None),
            Err(e) => (ServerConfig::default(), Some(e.to_string())),
        }
    } else {
        (ServerConfig::default(), None)
    };

    // Initialize logging
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = load_error {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        );
    }
    tracing::info!("Configuration loaded: {:?}", config);

    let temp_dir = config.converter_config().temp_dir;
    if !temp_dir.is_dir() {
        return Err(ServerError::Config(format!(
            "temp directory {} does not exist",
            temp_dir.display()
        )));
    }

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_log_filter(&config.log_level).into());

    if config.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_filter_parses() {
        let filter = default_log_filter(&ServerConfig::default().log_level);
        assert_eq!(
            filter,
            "media_converter=debug,media_convert_lib=debug,tower_http=debug"
        );
        assert!(tracing_subscriber::EnvFilter::try_new(&filter).is_ok());
    }
}
