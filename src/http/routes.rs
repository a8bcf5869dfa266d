//! Axum router configuration

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use media_convert_lib::MediaKind;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::metrics::metrics_handler;
use crate::state::AppState;

use super::handlers::{
    audio_info, convert_audio, convert_document, convert_image, convert_video, health_check,
    list_formats, version_check,
};

/// Raw body cap for one conversion route
fn body_limit(config: &ServerConfig, kind: MediaKind) -> DefaultBodyLimit {
    match config.body_limit_for(kind) {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    }
}

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let config = &state.config;

    let router = Router::new()
        // Conversion endpoints
        .route(
            "/api/audio/convert",
            post(convert_audio)
                .layer(body_limit(config, MediaKind::Audio))
                .get(audio_info),
        )
        .route(
            "/api/convert",
            post(convert_image).layer(body_limit(config, MediaKind::Image)),
        )
        .route(
            "/api/video/convert",
            post(convert_video).layer(body_limit(config, MediaKind::Video)),
        )
        .route(
            "/api/document/convert",
            post(convert_document).layer(body_limit(config, MediaKind::Document)),
        )
        .route("/api/formats", get(list_formats))
        // Health, version and metrics endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(TraceLayer::new_for_http());

    let router = if state.config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
            .expose_headers([header::CONTENT_DISPOSITION])
            .max_age(Duration::from_secs(3600));
        router.layer(cors)
    } else {
        router
    };

    router.with_state(state)
}
