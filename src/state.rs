//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - The converter, wired to log and count every conversion
//! - Metrics counters
//! - Server configuration

use std::sync::Arc;

use media_convert_lib::observer::Observers;
use media_convert_lib::{ConversionObserver, Converter, TracingObserver};

use crate::config::ServerConfig;
use crate::metrics::Metrics;

/// Application state shared across all handlers
pub struct AppState {
    /// Runs conversions
    pub converter: Converter,

    /// Request and conversion counters
    pub metrics: Arc<Metrics>,

    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let metrics = Arc::new(Metrics::new());
        let log: Arc<dyn ConversionObserver> = Arc::new(TracingObserver);
        let counters: Arc<dyn ConversionObserver> = metrics.clone();
        let converter = Converter::new(config.converter_config())
            .with_observer(Arc::new(Observers(vec![log, counters])));

        Self {
            converter,
            metrics,
            config,
        }
    }

    /// Create AppState with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_defaults()
    }
}
